/// Pull-model contract between storage-backed scans and the executors
/// above them.
///
/// `init` prepares (or re-prepares) the scan; `next` hands out one element
/// at a time until `None` marks end-of-stream. A finished iterator stays
/// finished until the next `init`. Implementations are not thread-safe;
/// each operator instance belongs to one execution thread.
pub trait OperatorIterator {
    type Item;

    fn init(&mut self);

    fn next(&mut self) -> Option<Self::Item>;
}
