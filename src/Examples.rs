//! Worked examples of the group contribution workflow, runnable from the interactive menu.
/// decomposition, training, estimation, reactions and cross validation on a small
/// acid and alcohol training set
pub mod gc_examples;
