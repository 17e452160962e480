pub mod optimizer;
pub mod pipeline;
pub mod resample;

pub use optimizer::{
    EchoPair, EchoPolicy, PatternSearchOptimizer, RegistrationRequest, RigidOptimizer,
};
pub use pipeline::{enumerate_units, run_epoch, EpochContext, SecondEcho};
