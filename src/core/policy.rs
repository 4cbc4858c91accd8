/// Resource envelope applied to every sandbox. Not configurable by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub cpus: &'static str,
    pub memory: &'static str,
    pub pids: u32,
    pub nproc: u32,
    pub nofile: u32,
    pub fsize_bytes: u64,
}

pub const SANDBOX_POLICY: ResourcePolicy = ResourcePolicy {
    cpus: "0.5",
    memory: "100m",
    pids: 20,
    nproc: 20,
    nofile: 64,
    fsize_bytes: 1_000_000,
};

impl ResourcePolicy {
    /// `docker run` flags enforcing this policy, capabilities and networking included.
    pub fn docker_args(&self) -> Vec<String> {
        vec![
            format!("--cpus={}", self.cpus),
            "-m".to_string(),
            self.memory.to_string(),
            "--cap-drop=ALL".to_string(),
            "--net=none".to_string(),
            format!("--pids-limit={}", self.pids),
            "--ulimit".to_string(),
            format!("nproc={0}:{0}", self.nproc),
            "--ulimit".to_string(),
            format!("nofile={0}:{0}", self.nofile),
            "--ulimit".to_string(),
            format!("fsize={0}:{0}", self.fsize_bytes),
        ]
    }

    /// `sh` prelude applying the per-process ulimits, then exec'ing `"$@"`.
    ///
    /// `ulimit -f` counts 512-byte blocks in POSIX sh.
    pub fn ulimit_prelude(&self) -> String {
        format!(
            "ulimit -n {} && ulimit -f {} && exec \"$@\"",
            self.nofile,
            self.fsize_bytes.div_ceil(512)
        )
    }
}
