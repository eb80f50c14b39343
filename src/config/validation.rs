use super::defaults::{
    MAX_AI_TOKENS, MAX_CLOSE_REFRESH_DELAY_MS, MAX_REQUEST_TIMEOUT_MS, MAX_TERMINAL_DIMENSION,
    MIN_REQUEST_TIMEOUT_MS,
};
use super::AppConfig;
use crate::pty_session::{resolve_executable, ShellCommand};
use anyhow::{bail, Context, Result};
use clap::Parser;

const MAX_TERMINALS_LIMIT: usize = 256;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if self.port == 0 {
            bail!("--port must be non-zero");
        }
        if self.host.trim().is_empty() {
            bail!("--host cannot be empty");
        }

        for (flag, value) in [
            ("--default-cols", self.default_cols),
            ("--default-rows", self.default_rows),
        ] {
            if !(1..=MAX_TERMINAL_DIMENSION).contains(&value) {
                bail!("{flag} must be between 1 and {MAX_TERMINAL_DIMENSION}, got {value}");
            }
        }
        if !(1..=MAX_TERMINALS_LIMIT).contains(&self.max_terminals) {
            bail!(
                "--max-terminals must be between 1 and {MAX_TERMINALS_LIMIT}, got {}",
                self.max_terminals
            );
        }

        for (flag, value) in [
            ("--stt-timeout-ms", self.stt_timeout_ms),
            ("--ai-timeout-ms", self.ai_timeout_ms),
        ] {
            if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&value) {
                bail!(
                    "{flag} must be between {MIN_REQUEST_TIMEOUT_MS} and {MAX_REQUEST_TIMEOUT_MS}, got {value}"
                );
            }
        }
        if !(1..=MAX_AI_TOKENS).contains(&self.ai_max_tokens) {
            bail!(
                "--ai-max-tokens must be between 1 and {MAX_AI_TOKENS}, got {}",
                self.ai_max_tokens
            );
        }
        if self.close_refresh_delay_ms > MAX_CLOSE_REFRESH_DELAY_MS {
            bail!("--close-refresh-delay-ms must be at most {MAX_CLOSE_REFRESH_DELAY_MS}");
        }

        let base_url = self.api_base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("--api-base-url must start with http:// or https://, got '{base_url}'");
        }
        self.api_base_url = base_url.to_string();
        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                self.api_key = None;
            }
        }

        validate_language(&self.stt_lang)?;

        // Fail at startup rather than on the first terminalCreate.
        let shell = ShellCommand::parse(&self.shell).context("invalid --shell")?;
        resolve_executable(&shell.program)
            .with_context(|| format!("--shell program '{}' not found", shell.program))?;

        if self.term_value.trim().is_empty() || self.term_value.contains('\0') {
            bail!("--term must be a non-empty value without NUL bytes");
        }

        if let Some(cwd) = &mut self.default_cwd {
            let canonical = cwd
                .canonicalize()
                .with_context(|| format!("failed to canonicalize --default-cwd '{}'", cwd.display()))?;
            if !canonical.is_dir() {
                bail!("--default-cwd '{}' is not a directory", canonical.display());
            }
            *cwd = canonical;
        }

        Ok(())
    }
}

fn validate_language(lang: &str) -> Result<()> {
    if lang.trim().is_empty() {
        bail!("--stt-lang must not be empty");
    }
    if lang.eq_ignore_ascii_case("auto") {
        return Ok(());
    }
    if !lang
        .chars()
        .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
    {
        bail!("--stt-lang must contain only alphabetic characters or '-'/'_' separators");
    }
    // Allow locale-style values but only check the leading code's shape.
    let primary = lang.split(['-', '_']).next().unwrap_or("");
    if !(2..=3).contains(&primary.len()) {
        bail!("--stt-lang must start with a two or three letter language code, got '{lang}'");
    }
    Ok(())
}
