//! 基于 `serialport` 的 USB 串口后端
//!
//! 设备按 USB 序列号查找，找不到时返回 [`SerialError::NotFound`]。

use super::{DataBits, DataFormat, FlowControl, Parity, SerialDevice, SerialError, ShutterSwitch, StopBits};
use serialport::{SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

impl From<serialport::Error> for SerialError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => SerialError::NotFound(e.description),
            serialport::ErrorKind::Io(kind) => SerialError::Io(io::Error::new(kind, e.description)),
            _ => SerialError::Backend(e.description),
        }
    }
}

/// 列出所有 USB 串口：`(端口路径, 序列号)`
pub fn list_devices() -> Result<Vec<(String, Option<String>)>, SerialError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .filter_map(|port| match port.port_type {
            SerialPortType::UsbPort(info) => Some((port.port_name, info.serial_number)),
            _ => None,
        })
        .collect())
}

/// 按序列号查找端口路径
fn find_port(serial_number: &str) -> Result<String, SerialError> {
    list_devices()?
        .into_iter()
        .find(|(_, serial)| serial.as_deref() == Some(serial_number))
        .map(|(path, _)| path)
        .ok_or_else(|| SerialError::NotFound(serial_number.to_string()))
}

fn open_port(serial_number: &str, baud: u32) -> Result<Box<dyn SerialPort>, SerialError> {
    let path = find_port(serial_number)?;
    debug!("Opening serial device {} at {}", serial_number, path);
    let port = serialport::new(&path, baud).timeout(DEFAULT_TIMEOUT).open()?;
    Ok(port)
}

/// USB 串口设备
pub struct UsbSerialDevice {
    port: Option<Box<dyn SerialPort>>,
    serial_number: String,
    write_timeout: Duration,
}

impl UsbSerialDevice {
    /// 按 USB 序列号打开设备
    pub fn open(serial_number: &str) -> Result<Self, SerialError> {
        let port = open_port(serial_number, 9600)?;
        Ok(Self {
            port: Some(port),
            serial_number: serial_number.to_string(),
            write_timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, SerialError> {
        self.port.as_mut().ok_or(SerialError::Closed)
    }
}

impl SerialDevice for UsbSerialDevice {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), SerialError> {
        self.port()?.set_baud_rate(baud)?;
        Ok(())
    }

    fn set_data_format(&mut self, format: DataFormat) -> Result<(), SerialError> {
        let port = self.port()?;
        port.set_data_bits(match format.data_bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        })?;
        port.set_parity(match format.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        })?;
        port.set_stop_bits(match format.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        })?;
        Ok(())
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<(), SerialError> {
        self.port()?.set_flow_control(match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::RtsCts => serialport::FlowControl::Hardware,
            FlowControl::XonXoff => serialport::FlowControl::Software,
        })?;
        Ok(())
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<(), SerialError> {
        // serialport 只有一个超时，写超时仅记录
        self.port()?.set_timeout(read)?;
        self.write_timeout = write;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        let port = self.port()?;
        match port.write_all(data) {
            Ok(()) => {
                port.flush()?;
                trace!("serial tx {} bytes", data.len());
                Ok(data.len())
            },
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::Io(e)),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let port = self.port()?;
        let mut filled = 0;
        while filled < buf.len() {
            match port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SerialError::Io(e)),
            }
        }
        Ok(filled)
    }

    fn close(&mut self) -> Result<(), SerialError> {
        self.port.take().map(|_| ()).ok_or(SerialError::Closed)
    }
}

/// 通过 RTS 线控制快门玻璃
pub struct UsbShutterSwitch {
    port: Box<dyn SerialPort>,
}

impl UsbShutterSwitch {
    pub fn open(serial_number: &str) -> Result<Self, SerialError> {
        let port = open_port(serial_number, 9600)?;
        Ok(Self { port })
    }
}

impl ShutterSwitch for UsbShutterSwitch {
    fn set(&mut self, on: bool) -> Result<(), SerialError> {
        self.port.write_request_to_send(on)?;
        Ok(())
    }
}
