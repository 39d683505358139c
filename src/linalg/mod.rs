pub mod block;

pub use block::{BlockLayout, BlockMatrix, BlockVector, ColBlockMatrix};
