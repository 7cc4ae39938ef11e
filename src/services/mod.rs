pub mod audio_writer;
pub mod synthesis;
pub mod text_chunker;

pub use audio_writer::{part_output_path, AudioWriter};
pub use synthesis::{SynthesisRequest, Synthesizer};
pub use text_chunker::{chunk_text, preprocess_text, split_into_chunks, TextChunker};
