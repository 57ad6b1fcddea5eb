pub mod decision;
pub mod evaluator;

pub use decision::GateDecision;
pub use evaluator::SafetyGate;
