use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const SIMPLE_PORT: u16 = 16735;
const COMPLEX_PORT: u16 = 16750;
const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum Channel {
    Simple,
    Complex,
}

#[derive(Debug, Deserialize)]
struct ControlMessage {
    action: u32,
    #[serde(rename = "controlCmd")]
    control_cmd: Option<ControlCmd>,
    msgid: String,
}

#[derive(Debug, Deserialize)]
struct ControlCmd {
    mode: u32,
    #[serde(rename = "type")]
    cmd_type: u32,
    time: u32,
    #[serde(rename = "delayTime")]
    delay_time: u32,
    data: Option<String>,
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn port_arg(flag: &str, default: u16) -> Result<u16, Box<dyn std::error::Error>> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            let value = args.next().ok_or(format!("{flag} needs a value"))?;
            return Ok(value.parse()?);
        }
    }
    Ok(default)
}

fn describe(channel: Channel, datagram: &[u8]) -> String {
    let text = String::from_utf8_lossy(datagram);
    match channel {
        Channel::Simple => format!("simple {text}"),
        Channel::Complex => match serde_json::from_str::<ControlMessage>(&text) {
            Ok(ControlMessage {
                action,
                control_cmd: Some(cmd),
                msgid,
            }) => format!(
                "complex action={action} mode={} type={} time={} delay={} data={} msgid={msgid}",
                cmd.mode,
                cmd.cmd_type,
                cmd.time,
                cmd.delay_time,
                cmd.data.as_deref().unwrap_or("-")
            ),
            Ok(msg) => format!("complex action={} msgid={} {text}", msg.action, msg.msgid),
            Err(err) => format!("complex (unparsed: {err}) {text}"),
        },
    }
}

async fn listen(
    channel: Channel,
    port: u16,
    tx: mpsc::UnboundedSender<(Channel, Vec<u8>)>,
) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, _from) = socket.recv_from(&mut buf).await?;
        if tx.send((channel, buf[..len].to_vec())).is_err() {
            return Ok(());
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let simple_port = port_arg("--simple-port", SIMPLE_PORT)?;
    let complex_port = port_arg("--complex-port", COMPLEX_PORT)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    for (channel, port) in [(Channel::Simple, simple_port), (Channel::Complex, complex_port)] {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = listen(channel, port, tx).await {
                eprintln!("udp-dev-listener: {channel:?} port {port} stopped: {err}");
            }
        });
    }
    drop(tx);

    println!("udp-dev-listener: simple={simple_port} complex={complex_port}");
    while let Some((channel, datagram)) = rx.recv().await {
        println!("<- {} {}", now_unix_ms(), describe(channel, &datagram));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_control_payload_fields() {
        let line = describe(
            Channel::Complex,
            br#"{"action":20000,"controlCmd":{"data":"HDMI1","delayTime":0,"mode":5,"time":0,"type":0},"msgid":"2"}"#,
        );
        assert_eq!(
            line,
            "complex action=20000 mode=5 type=0 time=0 delay=0 data=HDMI1 msgid=2"
        );
    }

    #[test]
    fn cast_payload_without_control_cmd_still_parses() {
        let line = describe(
            Channel::Complex,
            br#"{"action":30200,"customPlay":{"mediatype":2},"msgid":"2"}"#,
        );
        assert!(line.starts_with("complex action=30200 msgid=2"));
    }

    #[test]
    fn simple_payload_is_printed_raw() {
        assert_eq!(describe(Channel::Simple, b"KEYPRESSES:116"), "simple KEYPRESSES:116");
    }
}
