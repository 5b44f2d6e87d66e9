//! A firmware-shaped main loop: poll for messages, answer requests, emit
//! heartbeats.
//!
//! The transport is an in-memory queue here, so the "wire" is scripted, but
//! the loop body is exactly what would run on a real serial link.
//!
//! Run with `cargo run --example sensor-board`.

use oatmeal::{Device, DeviceConfig, MemoryTransport, Msg};

fn main() {
    let mut config = DeviceConfig::new("SensorBoard");
    config.version = Some("demo".into());
    let mut board = Device::new(MemoryTransport::new(), config);

    // Script some host traffic: a temperature request and a logging enable.
    let mut tmp = Msg::new();
    tmp.start("TMP", b'R', "h1");
    tmp.finish();
    let mut log_on = Msg::new();
    log_on.start("LOG", b'R', "h2");
    log_on.append(true);
    log_on.finish();
    {
        let transport = board.port_mut().transport_mut();
        transport.push_incoming(tmp.frame());
        transport.push_incoming(b"\n");
        transport.push_incoming(log_on.frame());
        transport.push_incoming(b"\n");
    }

    // The loop a firmware would run forever; bounded here to drain the script.
    for _ in 0..4 {
        while let Some(msg) = board.check_for_msgs() {
            if msg.is_opcode("TMPR") {
                let mut reply = Msg::new();
                reply.start_bytes(msg.command(), b'D', msg.token());
                reply.append(21.5f32);
                reply.finish();
                board.port_mut().send(&reply.as_view()).expect("write");
                println!("answered {msg} with {reply}");
            } else {
                board.port_mut().stats.unknown_opcode += 1;
                println!("unknown opcode in {msg}");
            }
        }

        if board.send_heartbeat_now() {
            let mut heartbeat = Msg::new();
            board.build_status_heartbeat(&mut heartbeat, 2);
            board.port_mut().send(&heartbeat.as_view()).expect("write");
            println!("heartbeat {heartbeat}");
        }

        board.log_info("loop done");
    }

    let written = board.port_mut().transport_mut().take_outgoing();
    println!("--- {} bytes written to the wire ---", written.len());
    print!("{}", String::from_utf8_lossy(&written));
}
