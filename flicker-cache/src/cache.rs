use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::RwLock;
pub use string_cache::DefaultAtom as Atom;

#[derive(Default)]
struct Interner {
    ids: HashMap<Atom, usize>,
    atoms: Vec<Atom>,
}

lazy_static! {
    static ref INTERNER: RwLock<Interner> = RwLock::new(Interner::default());
}

/// Intern a string and return its stable ID. IDs key the render caches
/// and the decoded-image bank, so the same name always maps to the same slot.
pub fn intern(s: &str) -> usize {
    let atom = Atom::from(s);
    {
        let interner = INTERNER.read().unwrap();
        if let Some(&id) = interner.ids.get(&atom) {
            return id;
        }
    }
    let mut interner = INTERNER.write().unwrap();
    if let Some(&id) = interner.ids.get(&atom) {
        return id;
    }
    let id = interner.atoms.len();
    interner.atoms.push(atom.clone());
    interner.ids.insert(atom, id);
    id
}

/// Look up a previously interned string by ID.
pub fn resolve(id: usize) -> Option<String> {
    INTERNER.read().unwrap().atoms.get(id).map(|a| a.to_string())
}

/// Current count of unique interned strings.
pub fn interned_count() -> usize {
    INTERNER.read().unwrap().atoms.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let a = intern("mask_1.png");
        let b = intern("mask_2.png");
        assert_ne!(a, b);
        assert_eq!(intern("mask_1.png"), a);
        assert_eq!(resolve(a).as_deref(), Some("mask_1.png"));
    }

    #[test]
    fn resolve_unknown_is_none() {
        assert_eq!(resolve(usize::MAX), None);
    }
}
