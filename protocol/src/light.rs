use crate::fragment_combiner::fragment_message;
use crate::protos::light::{DeviceInfo, DeviceMessage, LightControl, LightReport, LightState};
use anyhow::{Context, Result};
use protobuf::Message;
use std::net::UdpSocket;

pub const DEFAULT_CONTROL_PORT: u16 = 4210;

/// Control message for a brightness percentage; 0 switches the light off.
pub fn control_message(brightness_pct: u8) -> LightControl {
    let mut msg = LightControl::new();
    if brightness_pct == 0 {
        msg.set_state(LightState::OFF);
    } else {
        msg.set_state(LightState::ON);
        msg.set_brightness_pct(brightness_pct.into());
    }
    msg
}

/// Append the default control port unless `addr` already names one.
pub fn control_addr(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => addr.to_owned(),
        _ => format!("{}:{}", addr, DEFAULT_CONTROL_PORT),
    }
}

pub fn set_light(addr: &str, brightness_pct: u8) -> Result<()> {
    let udp = UdpSocket::bind("0.0.0.0:0")?;
    let out_bytes: Vec<u8> = control_message(brightness_pct).write_to_bytes()?;
    udp.send_to(&out_bytes, control_addr(addr))
        .with_context(|| format!("failed to send light control to {}", addr))?;
    Ok(())
}

/// State report as a fixture would send it.
pub fn report_message(device_id: u32, brightness_pct: u8) -> DeviceMessage {
    let mut info = DeviceInfo::new();
    info.set_id(device_id);

    let mut report = LightReport::new();
    report.info = Some(info).into();
    report.set_on(brightness_pct > 0);
    report.set_brightness_pct(brightness_pct.into());

    let mut msg = DeviceMessage::new();
    msg.light = Some(report).into();
    msg
}

/// Send a state report to the server's report listener.
pub fn send_report(server_addr: &str, seq: u8, device_id: u32, brightness_pct: u8) -> Result<()> {
    let udp = UdpSocket::bind("0.0.0.0:0")?;
    let out_bytes = report_message(device_id, brightness_pct).write_to_bytes()?;
    for datagram in fragment_message(seq, &out_bytes)? {
        udp.send_to(&datagram, server_addr)
            .with_context(|| format!("failed to send report to {}", server_addr))?;
    }
    Ok(())
}
