use burn::backend::libtorch::LibTorchDevice;

/// Parse a device name: `cpu`, `cuda`, `cuda:N`, or `mps`
pub fn parse_device(value: &str) -> Result<LibTorchDevice, DeviceError> {
    let value = value.trim().to_lowercase();

    match value.as_str() {
        "cpu" => Ok(LibTorchDevice::Cpu),
        "cuda" | "gpu" => Ok(LibTorchDevice::Cuda(0)),
        "mps" => Ok(LibTorchDevice::Mps),
        _ => match value.strip_prefix("cuda:") {
            Some(index) => index
                .parse()
                .map(LibTorchDevice::Cuda)
                .map_err(|_| DeviceError::Unknown(value.clone())),
            None => Err(DeviceError::Unknown(value)),
        },
    }
}

/// Device Error
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DeviceError {
    /// No device found for the given string
    #[error("no device found for {0}, expected cpu, cuda, cuda:N, or mps")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_device_names() {
        assert_eq!(parse_device("cpu"), Ok(LibTorchDevice::Cpu));
        assert_eq!(parse_device("CUDA"), Ok(LibTorchDevice::Cuda(0)));
        assert_eq!(parse_device("cuda:2"), Ok(LibTorchDevice::Cuda(2)));
        assert_eq!(parse_device("mps"), Ok(LibTorchDevice::Mps));
    }

    #[test]
    fn rejects_unknown_devices() {
        assert_eq!(
            parse_device("tpu"),
            Err(DeviceError::Unknown("tpu".to_string()))
        );
        assert!(parse_device("cuda:x").is_err());
    }
}
