pub mod consumer;

pub use consumer::KafkaTransport;
