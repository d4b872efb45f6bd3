//! Stream combinators shared across the blotter workspace.

pub mod stream;

pub mod prelude {
    pub use crate::stream::BlotterStreamExt;
}
