//! Whole-system report printed by the `gpuq` binary.

use std::fmt::{self, Write as _};

use gpuq_core::prelude::*;

/// Snapshot of a machine: runtimes, every device and the visible ones.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SystemReport {
    /// Presence of each provider's runtime, in flag order.
    pub providers: Vec<(Provider, bool)>,
    /// Devices on the machine, visible or not.
    pub all: Vec<Properties>,
    /// Devices usable by this process.
    pub visible: Vec<Properties>,
}

impl SystemReport {
    /// Query `imp` for everything the report shows.
    pub fn collect<I: Implementation + ?Sized>(imp: &I) -> Result<Self> {
        let providers = Provider::all()
            .iter()
            .map(|provider| (provider, imp.has_provider(provider)))
            .collect();
        Ok(Self {
            providers,
            all: imp.query(Provider::any(), false, Required::No)?,
            visible: imp.query(Provider::any(), true, Required::No)?,
        })
    }
}

fn section(out: &mut String, title: &str, devices: &[Properties]) -> fmt::Result {
    writeln!(out, "{title}")?;
    writeln!(out, "=====================")?;
    for device in devices {
        writeln!(out, "{device}")?;
    }
    Ok(())
}

impl fmt::Display for SystemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (provider, present) in &self.providers {
            writeln!(out, "Has provider {provider}: {present}")?;
        }
        writeln!(out)?;
        section(&mut out, "All devices:", &self.all)?;
        writeln!(out)?;
        section(&mut out, "Visible devices:", &self.visible)?;
        f.write_str(out.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_layout() {
        let mock = MockImplementation::new().cuda(Some(2)).cuda_visible([1]);
        let report = SystemReport::collect(&mock).unwrap();
        assert_eq!(report.all.len(), 2);
        assert_eq!(report.visible.len(), 1);

        let text = report.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Has provider CUDA: true");
        assert_eq!(lines[1], "Has provider HIP: false");
        assert_eq!(lines[3], "All devices:");
        assert!(text.contains("Properties(CUDA[0 -> None], 'CUDA Mock Device')"));
        assert!(text.contains("Visible devices:\n=====================\nProperties(CUDA[1 -> 0]"));
    }

    #[test]
    fn test_empty_machine() {
        let mock = MockImplementation::new().cuda(None);
        let text = SystemReport::collect(&mock).unwrap().to_string();
        assert!(text.ends_with("Visible devices:\n====================="));
    }
}
