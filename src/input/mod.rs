//! Receive side: reconstruction engine, sink-input adapter and the
//! capture-source variant.

pub mod source;
pub mod stream;

pub use source::SourceStream;
pub use stream::{InputStream, RxEngine, RxStats};
