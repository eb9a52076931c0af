//! `Display` for [`ServerConfig`], for startup-banner logging. Ported from
//! the teacher's `config::display`, minus the multi-server-block table
//! layout (this config only ever describes one listener).

use std::fmt;

use super::types::ServerConfig;

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "server:")?;
        writeln!(f, "  bind        = {}:{}", self.bind_addr, self.port)?;
        writeln!(f, "  static_dir  = {}", self.static_dir.display())?;
        writeln!(f, "  trig_mode   = {:#04b}", self.trig_mode)?;
        writeln!(f, "  timeout     = {:?}", self.timeout)?;
        writeln!(f, "  linger      = {}", self.linger)?;
        writeln!(f, "pool:")?;
        writeln!(f, "  threads     = {}", self.pool_threads)?;
        writeln!(f, "  conns       = {}", self.pool_conns)?;
        writeln!(f, "log:")?;
        writeln!(f, "  level       = {}", self.log_level)?;
        writeln!(f, "  queue_size  = {}", self.log_queue_size)?;
        write!(f, "  enable      = {}", self.log_enable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_panicking() {
        let cfg = ServerConfig::default();
        let text = format!("{cfg}");
        assert!(text.contains("bind"));
        assert!(text.contains("threads"));
    }
}
