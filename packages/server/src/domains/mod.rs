// Domain modules. Each domain owns its models and actions.

pub mod audit;
pub mod candidacies;
pub mod elections;
pub mod people;
