//! The EPC socket server: one dedicated worker thread per `START` arm,
//! accepting a single client at a time and servicing the request loop
//! described in SPEC_FULL.md §4.1/§4.3.

use crate::error::{ConnectionError, EpcError};
use crate::state::EndpointState;
use epc_host::DmaTarget;
use epc_host::unix_fd::recv_fd;
use epc_protocol::{
    AccessBarRequest, AccessType, BarSizeRequest, BarSubtype, HdrRequest, MessageTag,
    PROTOCOL_VERSION,
};
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

/// A running server instance. Dropping or calling [`ServerHandle::shutdown`]
/// unblocks the worker via `libc::shutdown` on the listener and (if present)
/// the currently accepted client, per the Cancellation notes in SPEC_FULL.md
/// §5, then joins the worker thread.
pub struct ServerHandle {
    listener_fd: RawFd,
    current_client_fd: Arc<Mutex<Option<RawFd>>>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn shutdown(mut self) {
        self.shutdown_mut();
    }

    fn shutdown_mut(&mut self) {
        unsafe {
            libc::shutdown(self.listener_fd, libc::SHUT_RDWR);
        }
        if let Some(fd) = *self.current_client_fd.lock().unwrap() {
            unsafe {
                libc::shutdown(fd, libc::SHUT_RDWR);
            }
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown_mut();
    }
}

/// Binds `socket_path` and spawns the accept-loop worker.
pub fn spawn(
    socket_path: PathBuf,
    state: Arc<EndpointState>,
    dma: Arc<dyn DmaTarget>,
) -> Result<ServerHandle, EpcError> {
    // A stale socket file from a prior, uncleanly-terminated run would
    // otherwise make bind() fail with AddrInUse.
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path).map_err(|source| EpcError::Bind {
        path: socket_path,
        source,
    })?;
    let listener_fd = listener.as_raw_fd();
    let current_client_fd = Arc::new(Mutex::new(None));
    let worker_client_fd = current_client_fd.clone();

    let join_handle = thread::spawn(move || accept_loop(listener, state, dma, worker_client_fd));

    Ok(ServerHandle {
        listener_fd,
        current_client_fd,
        join_handle: Some(join_handle),
    })
}

fn accept_loop(
    listener: UnixListener,
    state: Arc<EndpointState>,
    dma: Arc<dyn DmaTarget>,
    current_client_fd: Arc<Mutex<Option<RawFd>>>,
) {
    loop {
        let stream = match listener.accept() {
            Ok((stream, _addr)) => stream,
            Err(err) => {
                tracing::debug!("epc: accept loop exiting: {err}");
                return;
            }
        };
        *current_client_fd.lock().unwrap() = Some(stream.as_raw_fd());
        tracing::info!("epc: client connected");

        serve_connection(&stream, &state, &dma);

        *current_client_fd.lock().unwrap() = None;
        tracing::info!("epc: client disconnected");
    }
}

fn serve_connection(stream: &UnixStream, state: &EndpointState, dma: &Arc<dyn DmaTarget>) {
    loop {
        match handle_one_message(stream, state, dma) {
            Ok(()) => continue,
            Err(err) => {
                tracing::warn!("epc: closing connection: {err}");
                return;
            }
        }
    }
}

fn read_exact(stream: &UnixStream, buf: &mut [u8]) -> Result<(), ConnectionError> {
    (&mut &*stream).read_exact(buf).map_err(ConnectionError::from)
}

fn write_all(stream: &UnixStream, buf: &[u8]) -> Result<(), ConnectionError> {
    (&mut &*stream).write_all(buf).map_err(ConnectionError::from)
}

fn handle_one_message(
    stream: &UnixStream,
    state: &EndpointState,
    dma: &Arc<dyn DmaTarget>,
) -> Result<(), ConnectionError> {
    let mut tag_bytes = [0u8; 4];
    read_exact(stream, &mut tag_bytes)?;
    let tag = MessageTag::try_from(u32::from_le_bytes(tag_bytes))?;

    match tag {
        MessageTag::Ver => {
            write_all(stream, &PROTOCOL_VERSION.to_le_bytes())?;
        }
        MessageTag::Fd => {
            let fd = recv_fd(stream.as_raw_fd())?;
            state.store_shared_memfd(fd);
        }
        MessageTag::Hdr => {
            let mut buf = [0u8; HdrRequest::WIRE_LEN];
            read_exact(stream, &mut buf)?;
            let req = HdrRequest::from_bytes(&buf)?;
            req.validate()?;
            let bytes = state
                .config_space
                .read_range(req.offset, req.size)
                .ok_or(epc_protocol::DecodeError::ConfigSpaceOutOfBounds {
                    offset: req.offset,
                    size: req.size,
                })?;
            write_all(stream, &bytes)?;
        }
        MessageTag::Bar => {
            let mut subtype_byte = [0u8; 1];
            read_exact(stream, &mut subtype_byte)?;
            match BarSubtype::try_from(subtype_byte[0])? {
                BarSubtype::Mask => {
                    write_all(stream, &[state.bar_table.bar_mask()])?;
                }
                BarSubtype::Bar => {
                    let mut bar_no_byte = [0u8; BarSizeRequest::WIRE_LEN];
                    read_exact(stream, &mut bar_no_byte)?;
                    let req = BarSizeRequest::from_bytes(&bar_no_byte)?;
                    req.validate()?;
                    let size = state
                        .bar_table
                        .size_if_enabled(req.bar_no)
                        .ok_or(epc_protocol::DecodeError::BarNumberOutOfRange(req.bar_no))?;
                    write_all(stream, &size.to_le_bytes())?;
                }
            }
        }
        MessageTag::AccessBar => {
            let mut buf = [0u8; AccessBarRequest::WIRE_LEN];
            read_exact(stream, &mut buf)?;
            let req = AccessBarRequest::from_bytes(&buf)?;
            req.validate_bar_no()?;
            let access_type = req.access_type()?;
            let phys_addr = state
                .bar_table
                .phys_addr_if_enabled(req.bar_no)
                .ok_or(ConnectionError::BarDisabled(req.bar_no))?;

            match access_type {
                AccessType::Write => {
                    const MAX_PAYLOAD: u64 = 1 << 20;
                    if req.size > MAX_PAYLOAD {
                        return Err(ConnectionError::PayloadTooLarge(req.size));
                    }
                    let mut payload = vec![0u8; req.size as usize];
                    read_exact(stream, &mut payload)?;
                    let base = phys_addr
                        .checked_add(req.offset)
                        .ok_or(ConnectionError::DmaAddressOverflow)?;
                    dma.dma_write(base, &payload)?;
                }
                AccessType::Read => {
                    // No reply channel is defined for ACCESS_BAR (it is
                    // fire-and-forget from bridge to EPC); log and keep the
                    // connection open rather than inventing a response frame.
                    tracing::warn!("epc: ACCESS_BAR read is not implemented, ignoring");
                }
            }
        }
    }
    Ok(())
}
