/// Docker module contains the container backend: every request runs in a
/// throwaway container with fixed resource limits and no network.
pub mod runner;
