//! `MakeWriter` adapter: lets a `tracing_subscriber::fmt` layer render events
//! and hand each rendered record to the shipper as one line.

use super::actor::ShipperHandle;
use std::io;
use tracing_subscriber::fmt::MakeWriter;

/// Produces one [`RecordWriter`] per formatted event
#[derive(Clone)]
pub struct ShipperMakeWriter {
    handle: ShipperHandle,
}

impl ShipperMakeWriter {
    pub fn new(handle: ShipperHandle) -> Self {
        ShipperMakeWriter { handle }
    }
}

impl<'a> MakeWriter<'a> for ShipperMakeWriter {
    type Writer = RecordWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RecordWriter {
            handle: &self.handle,
            buf: Vec::with_capacity(256),
        }
    }
}

/// Collects one rendered record and ships it when dropped
pub struct RecordWriter<'a> {
    handle: &'a ShipperHandle,
    buf: Vec<u8>,
}

impl io::Write for RecordWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RecordWriter<'_> {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let record = String::from_utf8_lossy(&self.buf);
        self.handle.ship(record.trim_end_matches('\n'));
    }
}
