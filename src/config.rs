/// Runtime configuration for a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArborConfig {
    /// Pretty-print `data.json` files. Compact output is smaller; pretty
    /// output diffs better under version control.
    pub pretty_json: bool,
    /// Fsync files and parent directories after every atomic replace.
    pub sync_writes: bool,
}

impl Default for ArborConfig {
    fn default() -> Self {
        Self {
            pretty_json: false,
            sync_writes: true,
        }
    }
}

impl ArborConfig {
    pub fn durable() -> Self {
        Self {
            pretty_json: false,
            sync_writes: true,
        }
    }

    /// No fsync. Suitable for tests and tooling where the OS page cache
    /// is durability enough.
    pub fn fast() -> Self {
        Self {
            pretty_json: false,
            sync_writes: false,
        }
    }

    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }
}
