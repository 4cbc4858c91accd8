/// Native module contains the direct-process backend: the same invocations
/// run as a local process group, without Docker.
pub mod runner;
