pub mod roboflow;

pub use roboflow::RoboflowClient;
