mod throughput_probe;

pub use throughput_probe::ThroughputProbe;
