//! iPXE script builder.
//!
//! An append-only list of lines. Installers add their commands in order and
//! the script is serialized once, so the same calls always produce the same
//! bytes.

/// Phone-home event type sent when a machine fetches its boot script
pub const PROVISIONING_BOOTED: &str = "provisioning.104.01";

const HEADER: [&str; 3] = ["#!ipxe", "", "echo Tinkerbell Boots iPXE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    lines: Vec<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// Start a script with the `#!ipxe` header and banner.
    pub fn new() -> Self {
        Self {
            lines: HEADER.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    fn push(&mut self, line: String) -> &mut Self {
        self.lines.push(line);
        self
    }

    /// `set <name> <value>`
    pub fn set(&mut self, name: &str, value: impl AsRef<str>) -> &mut Self {
        self.push(format!("set {} {}", name, value.as_ref()))
    }

    /// Append `|| <cmd>` to the previous line.
    pub fn or(&mut self, cmd: &str) -> &mut Self {
        if let Some(last) = self.lines.last_mut() {
            last.push_str(" || ");
            last.push_str(cmd);
        }
        self
    }

    /// Append space-separated arguments to the previous line.
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        if let Some(last) = self.lines.last_mut() {
            for arg in args.iter().filter(|a| !a.is_empty()) {
                last.push(' ');
                last.push_str(arg);
            }
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.push(String::new())
    }

    /// POST a `provisioning.*` event to `${tinkerbell}/phone-home` from the
    /// booting firmware.
    pub fn phone_home(&mut self, event_type: &str) -> &mut Self {
        self.blank()
            .push("params".to_string())
            .push("param body Device connected to DHCP system".to_string())
            .push(format!("param type {}", event_type))
            .push("imgfetch ${tinkerbell}/phone-home##params".to_string())
            .push("imgfree".to_string())
            .blank()
    }

    pub fn kernel(&mut self, url: &str) -> &mut Self {
        self.push(format!("kernel {}", url))
    }

    pub fn initrd(&mut self, url: &str) -> &mut Self {
        self.push(format!("initrd {}", url))
    }

    pub fn boot(&mut self) -> &mut Self {
        self.push("boot".to_string())
    }

    pub fn chain(&mut self, url: &str) -> &mut Self {
        self.push(format!("chain --autofree {}", url))
    }

    pub fn shell(&mut self) -> &mut Self {
        self.push("shell".to_string())
    }

    /// Append a raw iPXE script, dropping its own `#!ipxe` line.
    pub fn append_raw(&mut self, script: &str) -> &mut Self {
        let body = script.trim_start().trim_start_matches("#!ipxe").trim_matches('\n');
        for line in body.lines() {
            self.lines.push(line.to_string());
        }
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Serialize: lines joined by `\n`, terminated by `\n`.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out.into_bytes()
    }
}
