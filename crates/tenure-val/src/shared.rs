use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub type Shared<T> = Rc<RefCell<T>>;

/// Non-owning back-reference. Graph-like structures should hold these for
/// their back edges; cycles between `Shared` cells are never collected.
pub type SharedWeak<T> = Weak<RefCell<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

pub fn weak<T>(value: &Shared<T>) -> SharedWeak<T> {
    Rc::downgrade(value)
}
