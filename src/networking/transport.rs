// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Framed transport: length-prefixed envelopes over TCP.
//!
//! Every frame is a u32 big-endian length followed by an encoded
//! [`Envelope`](crate::wire::proto::Envelope), capped at the configured
//! maximum message size on both the read and write paths. Handshake frames
//! travel in the clear; everything after rides inside `Sealed` bodies
//! protected by the session key. Four logical endpoints (handshake, sync
//! stream, event, heartbeat) share one connection, distinguished by body
//! kind.

use crate::core::security::{CryptoError, SealedPayload, SecurityEnvelope, SessionKey};
use crate::wire::convert::{decode_envelope, encode_envelope, WireError};
use crate::wire::proto::{self, envelope::Body};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Transport failures. A failure on a session's connection tears down only
/// that session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not bind the listener.
    #[error("bind: {0}")]
    Bind(String),
    /// Could not open an outbound connection.
    #[error("connect: {0}")]
    Connect(String),
    /// Stream I/O failed.
    #[error("io: {0}")]
    Io(String),
    /// Frame length exceeds the configured maximum.
    #[error("frame of {got} bytes exceeds the {limit}-byte limit")]
    TooLarge {
        /// Observed frame length.
        got: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// Malformed frame.
    #[error("malformed frame")]
    Decode,
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,
    /// A deadline elapsed.
    #[error("deadline exceeded")]
    Deadline,
    /// Sealing or opening a payload failed.
    #[error("payload rejected")]
    Crypto,
}

impl From<WireError> for TransportError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Decode => TransportError::Decode,
            WireError::TooLarge => TransportError::TooLarge { got: 0, limit: 0 },
        }
    }
}

/// Reading half of a framed connection.
pub struct FrameReader<R = OwnedReadHalf> {
    rd: R,
    max: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a read half with a frame size cap.
    pub fn new(rd: R, max: usize) -> Self {
        Self { rd, max }
    }

    /// Read one envelope. [`TransportError::Closed`] on clean EOF.
    pub async fn read_envelope(&mut self) -> Result<proto::Envelope, TransportError> {
        let len = match self.rd.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TransportError::Closed)
            }
            Err(e) => return Err(TransportError::Io(e.to_string())),
        };
        if len > self.max {
            return Err(TransportError::TooLarge {
                got: len,
                limit: self.max,
            });
        }
        let mut buf = BytesMut::zeroed(len);
        self.rd
            .read_exact(&mut buf)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        decode_envelope(&buf, self.max).map_err(TransportError::from)
    }
}

/// Writing half of a framed connection.
pub struct FrameWriter<W = OwnedWriteHalf> {
    wr: W,
    max: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a write half with a frame size cap.
    pub fn new(wr: W, max: usize) -> Self {
        Self { wr, max }
    }

    /// Write one envelope.
    pub async fn write_envelope(&mut self, env: &proto::Envelope) -> Result<(), TransportError> {
        let bytes = encode_envelope(env);
        if bytes.len() > self.max {
            return Err(TransportError::TooLarge {
                got: bytes.len(),
                limit: self.max,
            });
        }
        self.wr
            .write_u32(bytes.len() as u32)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.wr
            .write_all(&bytes)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.wr
            .flush()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Split a connected stream into framed halves.
pub fn split_framed(stream: TcpStream, max: usize) -> (FrameReader, FrameWriter) {
    let (rd, wr) = stream.into_split();
    (FrameReader::new(rd, max), FrameWriter::new(wr, max))
}

/// Seal an inner envelope for the wire.
pub fn seal_envelope(
    security: &SecurityEnvelope,
    key: &SessionKey,
    inner: &proto::Envelope,
) -> Result<proto::Envelope, TransportError> {
    let plain = encode_envelope(inner);
    let sealed = security
        .seal(&plain, key)
        .map_err(|_: CryptoError| TransportError::Crypto)?;
    Ok(proto::Envelope {
        corr: 0,
        body: Some(Body::Sealed(proto::Sealed {
            nonce: sealed.nonce.to_vec(),
            ciphertext: sealed.ciphertext,
        })),
    })
}

/// Open a sealed body back into the inner envelope.
pub fn open_envelope(
    security: &SecurityEnvelope,
    key: &SessionKey,
    sealed: &proto::Sealed,
    max: usize,
) -> Result<proto::Envelope, TransportError> {
    let nonce: [u8; 12] = sealed
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| TransportError::Crypto)?;
    let plain = security
        .open(
            &SealedPayload {
                nonce,
                ciphertext: sealed.ciphertext.clone(),
            },
            key,
        )
        .map_err(|_| TransportError::Crypto)?;
    decode_envelope(&plain, max).map_err(TransportError::from)
}

/// Open an outbound connection within `deadline`.
pub async fn dial(host: &str, port: u16, deadline: Duration) -> Result<TcpStream, TransportError> {
    let stream = timeout(deadline, TcpStream::connect((host, port)))
        .await
        .map_err(|_| TransportError::Deadline)?
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// The listening side of the transport.
pub struct TransportServer {
    listener: TcpListener,
}

impl TransportServer {
    /// Bind on all interfaces. Port 0 binds an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        Ok(Self { listener })
    }

    /// The actually bound port.
    pub fn local_port(&self) -> Result<u16, TransportError> {
        self.listener
            .local_addr()
            .map(|a| a.port())
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Accept one inbound connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        Ok((stream, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat_frame(corr: u64) -> proto::Envelope {
        proto::Envelope {
            corr,
            body: Some(Body::Heartbeat(proto::HeartbeatRequest {
                session_id: "s-1".into(),
                timestamp_ms: 42,
            })),
        }
    }

    #[tokio::test]
    async fn frames_roundtrip_over_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(1 << 16);
        let (_, wr) = tokio::io::split(client);
        let (rd, _) = tokio::io::split(server);
        let mut writer = FrameWriter::new(wr, 1 << 16);
        let mut reader = FrameReader::new(rd, 1 << 16);

        writer.write_envelope(&heartbeat_frame(7)).await.unwrap();
        let got = reader.read_envelope().await.unwrap();
        assert_eq!(got, heartbeat_frame(7));
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected_before_the_wire() {
        let (client, _server) = tokio::io::duplex(1 << 16);
        let (_, wr) = tokio::io::split(client);
        let mut writer = FrameWriter::new(wr, 8);
        let err = writer.write_envelope(&heartbeat_frame(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn closed_pipe_reads_as_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let (rd, _) = tokio::io::split(server);
        let mut reader = FrameReader::new(rd, 64);
        assert!(matches!(
            reader.read_envelope().await,
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn sealed_envelopes_roundtrip_and_reject_wrong_keys() {
        let security = SecurityEnvelope::new().unwrap();
        let key = security.generate_session_key().unwrap();
        let inner = heartbeat_frame(3);

        let sealed = seal_envelope(&security, &key, &inner).unwrap();
        let Some(Body::Sealed(body)) = &sealed.body else {
            panic!("expected sealed body");
        };
        let opened = open_envelope(&security, &key, body, 1 << 16).unwrap();
        assert_eq!(opened, inner);

        let other = security.generate_session_key().unwrap();
        assert!(matches!(
            open_envelope(&security, &other, body, 1 << 16),
            Err(TransportError::Crypto)
        ));
    }
}
