use crate::coordinator::Snapshot;

pub trait MetricCollector {
    fn publish(&mut self, snapshot: &Snapshot);

    /// Called once before the bridge exits.
    fn shutdown(&mut self) {}
}
