//! Printer transports for sending raw ESC/POS data
//!
//! Supports:
//! - Network printers (raw TCP, usually port 9100), addressed by a configured name
//! - Windows driver printers (RAW spooling via Win32 API)

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

/// Default raw printing port
pub const RAW_PORT: u16 = 9100;

/// A printer known to a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrinterInfo {
    pub name: String,
    pub is_default: bool,
}

/// Opaque channel to the OS printing subsystem
///
/// `send_raw` is the only call the queue needs; the discovery methods are
/// used to validate a printer before a job is admitted.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    /// Send a complete command stream to the named printer
    async fn send_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()>;

    /// Printers this transport can reach
    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>>;

    /// Name of the default printer, if any
    async fn default_printer(&self) -> Option<String> {
        self.list_printers()
            .await
            .ok()?
            .into_iter()
            .find(|p| p.is_default)
            .map(|p| p.name)
    }

    /// Whether a printer with this exact name exists
    async fn printer_exists(&self, printer: &str) -> bool {
        match self.list_printers().await {
            Ok(printers) => printers.iter().any(|p| p.name == printer),
            Err(e) => {
                warn!(error = %e, "Failed to list printers");
                false
            }
        }
    }
}

/// Network printers addressed by name
///
/// The first registered printer is the default.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    printers: Vec<(String, SocketAddr)>,
    timeout: Duration,
}

impl NetworkTransport {
    pub fn new() -> Self {
        Self {
            printers: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Register a printer under `name` (e.g. "kitchen" -> "192.168.1.100:9100")
    ///
    /// Port defaults to 9100 when the address has none.
    pub fn with_printer(mut self, name: &str, addr: &str) -> PrintResult<Self> {
        let addr = parse_addr(addr)?;
        self.printers.retain(|(n, _)| n != name);
        self.printers.push((name.to_string(), addr));
        Ok(self)
    }

    /// Parse a `name=host:port,name2=host:port` list
    pub fn from_list(list: &str) -> PrintResult<Self> {
        let mut transport = Self::new();
        for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, addr) = entry.split_once('=').ok_or_else(|| {
                PrintError::InvalidConfig(format!("Expected name=address, got: {}", entry))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(PrintError::InvalidConfig(format!(
                    "Empty printer name in: {}",
                    entry
                )));
            }
            transport = transport.with_printer(name, addr.trim())?;
        }
        Ok(transport)
    }

    /// Address registered for a printer name
    pub fn addr(&self, name: &str) -> Option<SocketAddr> {
        self.printers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_addr(addr: &str) -> PrintResult<SocketAddr> {
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }
    format!("{}:{}", addr, RAW_PORT)
        .parse()
        .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))
}

#[async_trait]
impl PrinterTransport for NetworkTransport {
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    async fn send_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()> {
        let addr = self
            .addr(printer)
            .ok_or_else(|| PrintError::PrinterNotFound(printer.to_string()))?;

        info!(%addr, "Connecting to printer");

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))?;

        stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        stream.flush().await?;

        info!(%addr, "Print data sent");
        Ok(())
    }

    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>> {
        Ok(self
            .printers
            .iter()
            .enumerate()
            .map(|(i, (name, _))| PrinterInfo {
                name: name.clone(),
                is_default: i == 0,
            })
            .collect())
    }
}

/// Windows driver printers
///
/// Uses the Win32 spooler with the RAW datatype so ESC/POS bytes reach the
/// device untouched.
#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct WindowsSpooler;

#[cfg(windows)]
impl WindowsSpooler {
    pub fn new() -> Self {
        Self
    }

    /// Installed printers (virtual printers filtered out)
    pub fn list() -> PrintResult<Vec<String>> {
        use windows::Win32::Graphics::Printing::{
            EnumPrintersW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_INFO_5W,
        };
        use windows::core::PWSTR;

        unsafe {
            let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
            let mut needed: u32 = 0;
            let mut returned: u32 = 0;

            let _ = EnumPrintersW(flags, None, 5, None, &mut needed, &mut returned);
            if needed == 0 {
                return Ok(Vec::new());
            }

            let mut buf: Vec<u8> = vec![0; needed as usize];
            EnumPrintersW(
                flags,
                None,
                5,
                Some(buf.as_mut_slice()),
                &mut needed,
                &mut returned,
            )
            .map_err(|_| PrintError::WindowsPrinter("EnumPrintersW failed".to_string()))?;

            let ptr = buf.as_ptr() as *const PRINTER_INFO_5W;
            let slice = std::slice::from_raw_parts(ptr, returned as usize);

            let mut result = Vec::new();
            for info in slice {
                if info.pPrinterName.is_null() {
                    continue;
                }
                let name = PWSTR(info.pPrinterName.0).to_string().unwrap_or_default();
                let port = if info.pPortName.is_null() {
                    String::new()
                } else {
                    PWSTR(info.pPortName.0).to_string().unwrap_or_default()
                };
                if !is_virtual_port(&port) {
                    result.push(name);
                }
            }
            Ok(result)
        }
    }

    /// System default printer
    pub fn system_default() -> Option<String> {
        use windows::Win32::Graphics::Printing::GetDefaultPrinterW;
        use windows::core::PWSTR;

        unsafe {
            let mut needed: u32 = 0;
            let _ = GetDefaultPrinterW(None, &mut needed);
            if needed == 0 {
                return None;
            }

            let mut buf: Vec<u16> = vec![0; needed as usize];
            if !GetDefaultPrinterW(Some(PWSTR(buf.as_mut_ptr())), &mut needed).as_bool() {
                return None;
            }
            PWSTR(buf.as_mut_ptr()).to_string().ok()
        }
    }

    fn write_raw(name: &str, data: &[u8]) -> PrintResult<()> {
        use core::ffi::c_void;
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, OpenPrinterW, PRINTER_HANDLE,
            StartDocPrinterW, StartPagePrinter, WritePrinter,
        };
        use windows::core::{PCWSTR, PWSTR};

        unsafe {
            let mut handle = PRINTER_HANDLE::default();
            let name_w = to_wide(name);

            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None)
                .map_err(|_| PrintError::WindowsPrinter(format!("OpenPrinterW failed: {}", name)))?;

            let doc_name_w = to_wide("ESC/POS Image");
            let datatype_w = to_wide("RAW");
            let doc_info = DOC_INFO_1W {
                pDocName: PWSTR(doc_name_w.as_ptr() as *mut _),
                pOutputFile: PWSTR::null(),
                pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
            };

            if StartDocPrinterW(handle, 1, &doc_info as *const DOC_INFO_1W) == 0 {
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter("StartDocPrinter failed".to_string()));
            }

            if !StartPagePrinter(handle).as_bool() {
                let _ = EndDocPrinter(handle);
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter("StartPagePrinter failed".to_string()));
            }

            let mut written: u32 = 0;
            let ok = WritePrinter(
                handle,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            );

            let _ = EndPagePrinter(handle);
            let _ = EndDocPrinter(handle);
            let _ = ClosePrinter(handle);

            if !ok.as_bool() {
                return Err(PrintError::WindowsPrinter("WritePrinter failed".to_string()));
            }
            if written != data.len() as u32 {
                return Err(PrintError::WindowsPrinter("Incomplete write".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(windows)]
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
fn is_virtual_port(port: &str) -> bool {
    let p = port.to_lowercase();
    p == "file:"
        || p == "portprompt:"
        || p == "xpsport:"
        || p.starts_with("onenote")
        || p == "nul:"
        || p.starts_with("wfsport:")
}

#[cfg(windows)]
#[async_trait]
impl PrinterTransport for WindowsSpooler {
    async fn send_raw(&self, printer: &str, data: &[u8]) -> PrintResult<()> {
        // Spooler calls are blocking
        let name = printer.to_string();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || Self::write_raw(&name, &data))
            .await
            .map_err(|e| PrintError::WindowsPrinter(format!("Task join failed: {}", e)))?
    }

    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>> {
        tokio::task::spawn_blocking(|| {
            let default = Self::system_default();
            Self::list().map(|names| {
                names
                    .into_iter()
                    .map(|name| PrinterInfo {
                        is_default: default.as_deref() == Some(name.as_str()),
                        name,
                    })
                    .collect()
            })
        })
        .await
        .map_err(|e| PrintError::WindowsPrinter(format!("Task join failed: {}", e)))?
    }

    async fn default_printer(&self) -> Option<String> {
        tokio::task::spawn_blocking(Self::system_default)
            .await
            .ok()
            .flatten()
    }
}
