mod event;
mod event_manager;
mod event_reader;
mod event_writer;
mod glue;
mod probe;

pub use event_manager::{discover, list, natural_cmp, resolve, ReaderManager, EVENT_PATH};
pub use event_reader::PhysicalDevice;
pub use event_writer::{VirtualDevice, WriterManager};
pub use probe::probe;
