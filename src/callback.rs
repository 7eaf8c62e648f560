//! Single-slot handler storage used for every socket event.
//!
//! A slot holds zero or one handler. Setting a handler replaces the previous
//! one, invoking an empty slot does nothing. Handlers are cloned out of the
//! slot before they run, so a handler may replace itself or call back into
//! the socket that owns the slot.

use std::{cell::RefCell, rc::Rc};

////////////////////////////////////////////////////////////////////////////////

/// Handler slot receiving the event payload by reference.
pub struct Callback<T: ?Sized + 'static> {
    handler: RefCell<Option<Rc<dyn Fn(&T)>>>,
}

impl<T: ?Sized + 'static> Callback<T> {
    pub fn new() -> Self {
        Self {
            handler: RefCell::new(None),
        }
    }

    pub fn set<F>(&self, handler: F)
    where
        F: Fn(&T) + 'static,
    {
        *self.handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Stores `handler` with `ctx` bound as its leading argument.
    pub fn bind<C, F>(&self, ctx: C, handler: F)
    where
        C: 'static,
        F: Fn(&C, &T) + 'static,
    {
        self.set(move |value| handler(&ctx, value))
    }

    pub fn clear(&self) {
        self.handler.borrow_mut().take();
    }

    pub fn is_set(&self) -> bool {
        self.handler.borrow().is_some()
    }

    pub fn invoke(&self, value: &T) {
        let handler = self.handler.borrow().clone();
        if let Some(handler) = handler {
            handler(value)
        }
    }
}

impl<T: ?Sized + 'static> Default for Callback<T> {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Handler slot receiving the event payload by value.
///
/// Used where the payload is handed over to the application, e.g. a freshly
/// accepted connection.
pub struct Handoff<T: 'static> {
    handler: RefCell<Option<Rc<dyn Fn(T)>>>,
}

impl<T: 'static> Handoff<T> {
    pub fn new() -> Self {
        Self {
            handler: RefCell::new(None),
        }
    }

    pub fn set<F>(&self, handler: F)
    where
        F: Fn(T) + 'static,
    {
        *self.handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn bind<C, F>(&self, ctx: C, handler: F)
    where
        C: 'static,
        F: Fn(&C, T) + 'static,
    {
        self.set(move |value| handler(&ctx, value))
    }

    pub fn clear(&self) {
        self.handler.borrow_mut().take();
    }

    pub fn is_set(&self) -> bool {
        self.handler.borrow().is_some()
    }

    /// Passes `value` to the handler, or drops it when the slot is empty.
    pub fn invoke(&self, value: T) {
        let handler = self.handler.borrow().clone();
        if let Some(handler) = handler {
            handler(value)
        }
    }
}

impl<T: 'static> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
