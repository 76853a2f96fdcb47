//! Board discovery over the OS serial port enumeration.

use thiserror::Error;

/// Descriptor keywords that mark a port as a likely USB-to-serial bridge.
pub const BRIDGE_KEYWORDS: [&str; 5] = ["usb", "esp32", "cp210", "ch340", "wch"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("serial enumeration failed: {0}")]
    Enumeration(#[from] serialport::Error),
}

/// One enumerated port as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    /// Free-text bridge descriptor; empty when the OS reports none.
    pub descriptor: String,
}

/// Seam over the OS-level port enumeration.
pub trait PortEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<Vec<PortCandidate>, DiscoveryError>;
}

/// Production enumerator backed by the system serial stack.
#[derive(Debug, Default)]
pub struct SystemEnumerator;

impl PortEnumerator for SystemEnumerator {
    fn enumerate(&self) -> Result<Vec<PortCandidate>, DiscoveryError> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(candidate_from_info).collect())
    }
}

fn candidate_from_info(info: serialport::SerialPortInfo) -> PortCandidate {
    let descriptor = match info.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let mut parts = Vec::new();
            if let Some(manufacturer) = usb.manufacturer {
                parts.push(manufacturer);
            }
            if let Some(product) = usb.product {
                parts.push(product);
            }
            parts.join(" ")
        }
        // Non-USB ports carry no descriptor text and never match the
        // bridge keywords.
        _ => String::new(),
    };
    PortCandidate {
        name: info.port_name,
        descriptor,
    }
}

fn is_bridge(descriptor: &str) -> bool {
    let descriptor = descriptor.to_lowercase();
    BRIDGE_KEYWORDS
        .iter()
        .any(|keyword| descriptor.contains(keyword))
}

/// Finds currently attached candidate boards. Rediscovery happens on every
/// call; nothing is cached between calls.
pub struct DeviceRegistry {
    enumerator: Box<dyn PortEnumerator>,
}

impl DeviceRegistry {
    pub fn new(enumerator: Box<dyn PortEnumerator>) -> Self {
        Self { enumerator }
    }

    /// Registry backed by the real OS enumeration.
    pub fn system() -> Self {
        Self::new(Box::new(SystemEnumerator))
    }

    /// Ports whose descriptor matches the bridge heuristic, in enumeration
    /// order. An empty list is a normal outcome; only a failing enumeration
    /// backend is an error.
    pub fn discover(&self) -> Result<Vec<String>, DiscoveryError> {
        let candidates = self.enumerator.enumerate()?;
        let ports: Vec<String> = candidates
            .into_iter()
            .filter(|candidate| is_bridge(&candidate.descriptor))
            .map(|candidate| candidate.name)
            .collect();
        tracing::debug!("Discovered {} candidate board(s): {:?}", ports.len(), ports);
        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEnumerator {
        candidates: Vec<PortCandidate>,
    }

    impl PortEnumerator for FakeEnumerator {
        fn enumerate(&self) -> Result<Vec<PortCandidate>, DiscoveryError> {
            Ok(self.candidates.clone())
        }
    }

    struct FailingEnumerator;

    impl PortEnumerator for FailingEnumerator {
        fn enumerate(&self) -> Result<Vec<PortCandidate>, DiscoveryError> {
            Err(DiscoveryError::Enumeration(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "enumeration backend unavailable",
            )))
        }
    }

    fn candidate(name: &str, descriptor: &str) -> PortCandidate {
        PortCandidate {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    #[test]
    fn test_accepts_known_bridge_descriptors() {
        let registry = DeviceRegistry::new(Box::new(FakeEnumerator {
            candidates: vec![
                candidate("/dev/ttyUSB0", "Silicon Labs CP2102N USB to UART Bridge Controller"),
                candidate("/dev/ttyUSB1", "1a86 USB Serial"),
                candidate("/dev/ttyACM0", "Espressif ESP32-S3"),
            ],
        }));

        let ports = registry.discover().unwrap();
        assert_eq!(ports, ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0"]);
    }

    #[test]
    fn test_rejects_non_bridge_descriptors() {
        let registry = DeviceRegistry::new(Box::new(FakeEnumerator {
            candidates: vec![
                candidate("/dev/ttyS0", ""),
                candidate("/dev/ttyS1", "PCI 16550A UART"),
                candidate("/dev/ttyUSB0", "FTDI FT232R USB UART"),
            ],
        }));

        let ports = registry.discover().unwrap();
        assert_eq!(ports, ["/dev/ttyUSB0"]);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        assert!(is_bridge("WCH CH340 Serial Converter"));
        assert!(is_bridge("esp32 devkit"));
        assert!(is_bridge("Usb Uart"));
        assert!(!is_bridge("Bluetooth modem"));
    }

    #[test]
    fn test_enumeration_order_is_preserved() {
        let registry = DeviceRegistry::new(Box::new(FakeEnumerator {
            candidates: vec![
                candidate("COM7", "CH340 serial"),
                candidate("COM3", "CP2102 bridge"),
                candidate("COM5", "esp32 native usb"),
            ],
        }));

        let ports = registry.discover().unwrap();
        assert_eq!(ports, ["COM7", "COM3", "COM5"]);
    }

    #[test]
    fn test_empty_enumeration_is_not_an_error() {
        let registry = DeviceRegistry::new(Box::new(FakeEnumerator {
            candidates: Vec::new(),
        }));
        assert_eq!(registry.discover().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_backend_failure_is_an_error() {
        let registry = DeviceRegistry::new(Box::new(FailingEnumerator));
        assert!(matches!(
            registry.discover(),
            Err(DiscoveryError::Enumeration(_))
        ));
    }
}
