mod sample;

pub use sample::{SampleBehavior, SampleProvider};
