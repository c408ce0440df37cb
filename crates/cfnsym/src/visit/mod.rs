//! visitor pattern helpers
mod visit_ternaries;
pub use visit_ternaries::{Ternary, TernarySite, VisitTernaries};

/// Visitor that receives its subjects by value
pub trait Visit<T> {
    fn visit(&mut self, value: T);
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(T),
{
    fn visit(&mut self, value: T) {
        self(value)
    }
}
