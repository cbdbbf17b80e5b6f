use bytes::Bytes;

/// Flat row image handed across the operator iterator boundary.
///
/// The storage core does not interpret the payload; executors and the
/// catalog layer above agree on the column encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Bytes,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Tuple {
            data: Bytes::from(data),
        }
    }

    pub fn from_bytes(data: Bytes) -> Self {
        Tuple { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
