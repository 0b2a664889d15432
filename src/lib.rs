//! Invariant shape descriptors, separated random geometries and point group
//! bookkeeping for small-molecule reconstruction studies

pub mod atoms;
pub mod config;
pub mod optimise;
pub mod descriptor;
pub mod symmetry;
pub mod results;
pub mod grouping;
pub mod testset;
pub mod batch;
