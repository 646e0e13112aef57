use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{env, utils};

static NAVDATA_PACKET_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes raw received datagrams to numbered files for offline protocol
/// debugging. Inactive unless the dump directory is configured.
#[derive(Debug, Clone)]
pub struct PacketDumper {
    dir: PathBuf,
    packet_no: &'static AtomicU64,
}

impl PacketDumper {
    pub fn from_env(name: &str) -> Option<Self> {
        let base = env::ENV_ARDRONE_DUMP_DIR.clone();
        if base.is_empty() {
            return None;
        }
        let dir = PathBuf::from(base)
            .join(name)
            .join(format!("dump_{}", utils::now_secs()));
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("can't create dump dir {:?}: {e}", dir);
            return None;
        }
        Some(Self {
            dir,
            packet_no: &NAVDATA_PACKET_COUNTER,
        })
    }

    pub fn dump(&self, buff: &[u8]) {
        let packet_no = self.packet_no.fetch_add(1, Ordering::Relaxed);
        let f_name = format!("packet_{packet_no}");
        let file_path = self.dir.join(f_name);
        let r = std::fs::write(file_path, buff);
        if r.is_err() {
            tracing::warn!("can't dump the packet contents: {}", r.unwrap_err());
        }
    }
}
