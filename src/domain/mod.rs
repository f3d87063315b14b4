pub mod codes;
pub mod derive;
pub mod entities;
pub mod reconcile;
