//! Assembly of finished storybooks and everything that happens to them
//! afterwards: the gallery page, the PDF storybook and the on-disk record.

pub mod assembler;
pub mod export;
pub mod gallery;
pub mod renderer;
pub mod store;

pub use assembler::{new_storybook_id, AssemblyOptions, CancelFlag, StorybookAssembler};
pub use store::{StorybookRecord, StorybookStore};
