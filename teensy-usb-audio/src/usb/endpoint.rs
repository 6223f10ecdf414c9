//! Transfer-layer seam.
//!
//! The streaming core never touches USB controller registers. Each
//! isochronous endpoint (audio OUT, audio IN, feedback IN) is reached through
//! an [`IsoEndpoint`], implemented by the board support code on top of its
//! transfer descriptors. The implementor also owns cache maintenance of the
//! buffer it exposes.

/// One isochronous endpoint with a single in-flight transfer.
pub trait IsoEndpoint {
    /// The endpoint's DMA-visible transfer buffer.
    ///
    /// After a receive completion it holds the bytes the host sent; before
    /// arming a transmit it is where the payload is written.
    fn buffer(&mut self) -> &mut [u8];

    /// Queue the next transfer over the first `len` bytes of
    /// [`buffer`](Self::buffer). For receive endpoints `len` is the maximum
    /// number of bytes accepted.
    fn arm(&mut self, len: usize);
}

impl<E: IsoEndpoint + ?Sized> IsoEndpoint for &mut E {
    fn buffer(&mut self) -> &mut [u8] {
        (**self).buffer()
    }

    fn arm(&mut self, len: usize) {
        (**self).arm(len)
    }
}

/// In-memory endpoint that records every arm request.
#[cfg(test)]
pub(crate) struct TestEndpoint<const N: usize> {
    pub buf: [u8; N],
    pub armed: std::vec::Vec<usize>,
}

#[cfg(test)]
impl<const N: usize> TestEndpoint<N> {
    pub fn new() -> Self {
        TestEndpoint {
            buf: [0; N],
            armed: std::vec::Vec::new(),
        }
    }

    /// Bytes covered by the most recent arm request.
    pub fn payload(&self) -> &[u8] {
        let len = self.armed.last().copied().unwrap_or(0);
        &self.buf[..len]
    }
}

#[cfg(test)]
impl<const N: usize> IsoEndpoint for TestEndpoint<N> {
    fn buffer(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn arm(&mut self, len: usize) {
        assert!(len <= N, "armed {len} bytes on a {N}-byte endpoint");
        self.armed.push(len);
    }
}
