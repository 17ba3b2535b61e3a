mod common;
mod test_convergence;
mod test_engine;
