pub mod text_loader;

pub use text_loader::{collect_input_pairs, decode_text, output_path_for, read_text_file, InputPair};
