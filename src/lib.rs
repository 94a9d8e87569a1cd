// Copyright 2025 Cornell University
// released under MIT License

pub mod action;
pub mod alphabet;
pub mod automaton;
pub mod bes;
pub mod diagnostic;
pub mod errors;
pub mod expr;
pub mod guarded;
pub mod modal;
pub mod model;
pub mod operators;
pub mod parser;
pub mod product;
pub mod prune;
pub mod refine;
pub mod runtime;
pub mod serialize;
pub mod smt;
pub mod solver;
pub mod weak;
