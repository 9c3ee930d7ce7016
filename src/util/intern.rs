use std::{collections::HashMap, fmt, num::NonZeroU32, rc::Rc};

use crate::types::well_known;

/// A handle to an interned identifier. To retrieve its text, use
/// [`Interner::get`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interned(NonZeroU32);

impl Interned {
    pub(crate) const fn from_index(index: u32) -> Interned {
        match NonZeroU32::new(index + 1) {
            Some(handle) => Interned(handle),
            None => panic!("interned handle overflow"),
        }
    }

    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl fmt::Debug for Interned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interned({})", self.0)
    }
}

/// Deduplicates identifier text for one compilation.
///
/// A fresh interner already holds every name in [`well_known::ALL`], at the
/// handles those constants expect.
pub struct Interner {
    map: HashMap<Rc<str>, Interned>,
    vec: Vec<Rc<str>>,
}

impl Interner {
    pub fn with_capacity(capacity: usize) -> Interner {
        let mut interner = Interner {
            map: HashMap::with_capacity(capacity),
            vec: Vec::with_capacity(capacity),
        };
        for &(expected, name) in well_known::ALL {
            let handle = interner.intern(name);
            debug_assert_eq!(handle, expected);
        }
        interner
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Interns the provided text, returning a handle which can be used to
    /// retrieve it later.
    pub fn intern(&mut self, text: &str) -> Interned {
        if let Some(&handle) = self.map.get(text) {
            return handle;
        }
        let index = u32::try_from(self.vec.len()).unwrap_or(u32::MAX - 1);
        let handle = Interned::from_index(index);
        let key: Rc<str> = Rc::from(text);
        self.vec.push(Rc::clone(&key));
        self.map.insert(key, handle);
        handle
    }

    /// Returns the text for the provided handle. Panics if it was produced by
    /// another interner.
    pub fn get(&self, handle: Interned) -> &str {
        &self.vec[handle.index()]
    }
}

impl Default for Interner {
    fn default() -> Self {
        Interner::with_capacity(128)
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (i, text) in self.vec.iter().enumerate() {
            map.entry(&(i + 1), text);
        }
        map.finish()
    }
}
