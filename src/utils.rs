use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{DroneError, Result};

fn take<const N: usize>(buff: &[u8], index: usize) -> Result<[u8; N]> {
    buff.get(index..index + N)
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
        .ok_or_else(|| {
            DroneError::MalformedPacket(format!(
                "read of {N} bytes at offset {index} past buffer end ({} bytes)",
                buff.len()
            ))
        })
}

pub(crate) fn get_u16(buff: &[u8], index: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(take(buff, index)?))
}

pub(crate) fn get_u32(buff: &[u8], index: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(take(buff, index)?))
}

pub(crate) fn get_i32(buff: &[u8], index: usize) -> Result<i32> {
    Ok(i32::from_le_bytes(take(buff, index)?))
}

pub(crate) fn get_f32(buff: &[u8], index: usize) -> Result<f32> {
    Ok(f32::from_le_bytes(take(buff, index)?))
}

pub(crate) fn get_f64(buff: &[u8], index: usize) -> Result<f64> {
    Ok(f64::from_le_bytes(take(buff, index)?))
}

pub(crate) fn now_secs() -> u64 {
    let tm = SystemTime::now().duration_since(UNIX_EPOCH);
    match tm {
        Ok(tm) => tm.as_secs(),
        Err(_) => 0,
    }
}
