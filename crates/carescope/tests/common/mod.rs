//! Common test utilities for CareScope integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

const CLEARED_ENV: [&str; 10] = [
    "XAI_API_KEY",
    "OPENAI_API_KEY",
    "CARESCOPE_API_BASE",
    "CARESCOPE_MODEL",
    "CARESCOPE_DATA_DIR",
    "TAVILY_API_KEY",
    "SNOWFLAKE_TOKEN",
    "CARESCOPE_DELEGATION",
    "HOST",
    "PORT",
];

/// Isolated home directory for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let config_dir = temp_dir.path().join(".carescope");

        Ok(Self {
            temp_dir,
            config_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Command with HOME pointing at the temp dir and no ambient credentials
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_carescope"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.current_dir(self.temp_dir.path());
        for key in CLEARED_ENV {
            cmd.env_remove(key);
        }
        cmd
    }

    pub fn write_config(&self, json: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::write(self.config_file(), json)?;
        Ok(())
    }
}
