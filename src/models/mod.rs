pub mod item;
pub mod loaders;
pub mod options;

pub use item::{BatchItem, BatchStats, ItemId, ItemStatus};
pub use loaders::{collect_input_pairs, read_text_file, InputPair};
pub use options::RunOptions;
