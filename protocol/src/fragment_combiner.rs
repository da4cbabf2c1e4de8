use anyhow::{bail, Result};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::{SocketAddr, UdpSocket};
use tracing::warn;

// Datagram header: [magic, flags, seq, is_final, fragment index]
pub const FRAG_MAGIC: u8 = 0xfa;
const FRAG_FLAGS: u8 = 1;
const MAX_MESSAGE_SIZE: usize = 65536;
pub const MAX_UDP: usize = 1460;
const FRAG_INFO_SZ: usize = 5;
const MAX_FRAGMENT: usize = MAX_UDP - FRAG_INFO_SZ;
const MAX_FRAGMENTS: usize = MAX_MESSAGE_SIZE.div_ceil(MAX_FRAGMENT);
const _: () = assert!(MAX_FRAGMENTS <= u64::BITS as usize);

#[derive(Debug)]
struct FragInfo {
    seq: u8,
    is_final: bool,
    index: u8,
}

impl FragInfo {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAG_INFO_SZ {
            bail!("too short message, len: {}", buf.len());
        }
        if buf[0] != FRAG_MAGIC {
            bail!("bad magic: {}", buf[0]);
        }
        if buf[1] != FRAG_FLAGS {
            bail!("unsupported flags: {}", buf[1]);
        }
        Ok(FragInfo {
            seq: buf[2],
            is_final: buf[3] != 0,
            index: buf[4],
        })
    }
}

struct LastFragment {
    count: u8,
    total_size: usize,
}

struct Fragments {
    seq: u8,
    // Bit i is set once fragment i has been copied in.
    arrived: u64,
    last: Option<LastFragment>,
    message: Vec<u8>,
}

impl Fragments {
    fn new(seq: u8) -> Self {
        Fragments {
            seq,
            arrived: 0,
            last: None,
            message: Vec::new(),
        }
    }

    // Returns the whole message once every fragment up to the final one
    // has arrived. Repeated fragments are ignored.
    fn add(&mut self, info: &FragInfo, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        let begin = usize::from(info.index) * MAX_FRAGMENT;
        let end = begin + payload.len();

        if end > MAX_MESSAGE_SIZE {
            bail!("message too large: {}", end);
        }
        // Past the size check the index is below MAX_FRAGMENTS.
        let bit = 1u64 << info.index;
        if self.arrived & bit != 0 {
            return Ok(None);
        }

        if info.is_final {
            if self.last.is_some() {
                bail!("second final fragment: {}", info.index);
            }
            if self.arrived >> (info.index + 1) != 0 {
                bail!("fragment after final fragment {}", info.index);
            }
            self.last = Some(LastFragment {
                count: info.index + 1,
                total_size: end,
            });
        } else {
            if payload.len() != MAX_FRAGMENT {
                bail!("wrong packet size: {}", payload.len() + FRAG_INFO_SZ);
            }
            if matches!(&self.last, Some(last) if info.index >= last.count) {
                bail!("fragment {} after final fragment", info.index);
            }
        }

        if self.message.len() < end {
            self.message.resize(end, 0);
        }
        self.message[begin..end].copy_from_slice(payload);
        self.arrived |= bit;

        match &self.last {
            Some(last) if self.arrived == (1u64 << last.count) - 1 => {
                let total_size = last.total_size;
                let mut message = std::mem::take(&mut self.message);
                message.truncate(total_size);
                *self = Fragments::new(self.seq);
                Ok(Some(message))
            }
            _ => Ok(None),
        }
    }
}

/// Split an encoded message into datagrams for [`FragmentCombiner`].
pub fn fragment_message(seq: u8, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        bail!("message too large: {}", bytes.len());
    }

    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![bytes]
    } else {
        bytes.chunks(MAX_FRAGMENT).collect()
    };
    let count = chunks.len();

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut datagram = Vec::with_capacity(FRAG_INFO_SZ + chunk.len());
            // At most MAX_FRAGMENTS fragments, the index fits a byte.
            datagram.extend_from_slice(&[
                FRAG_MAGIC,
                FRAG_FLAGS,
                seq,
                u8::from(index + 1 == count),
                index as u8,
            ]);
            datagram.extend_from_slice(chunk);
            datagram
        })
        .collect())
}

pub trait MessageHandler<T> {
    fn on_message(&mut self, src: SocketAddr, msg: T) -> anyhow::Result<()>;
}

/// Reassembles fragmented datagrams per sender and passes each decoded
/// message to the handler.
pub struct FragmentCombiner<T, H> {
    hosts: HashMap<SocketAddr, Fragments>,
    handler: H,
    message: PhantomData<fn() -> T>,
}

impl<T: protobuf::Message, H: MessageHandler<T>> FragmentCombiner<T, H> {
    pub fn new(handler: H) -> Self {
        FragmentCombiner {
            hosts: HashMap::new(),
            handler,
            message: PhantomData,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Receive from an already bound socket until it fails.
    pub fn serve(&mut self, socket: &UdpSocket) -> anyhow::Result<()> {
        loop {
            let mut buf = [0; MAX_UDP];
            let (sz, src) = socket.recv_from(&mut buf)?;

            if let Err(e) = self.add_fragment(src, &buf[..sz]) {
                warn!(%src, error = %e, "dropping datagram");
            }
        }
    }

    pub fn add_fragment(&mut self, src: SocketAddr, buf: &[u8]) -> Result<()> {
        let info = FragInfo::parse(buf)?;

        let curr = self
            .hosts
            .entry(src)
            .or_insert_with(|| Fragments::new(info.seq));
        if curr.seq != info.seq {
            *curr = Fragments::new(info.seq);
        }

        if let Some(bytes) = curr.add(&info, &buf[FRAG_INFO_SZ..])? {
            let message = T::parse_from_bytes(&bytes)?;
            self.handler.on_message(src, message)?;
        }
        Ok(())
    }
}
