//! Loopback demo: a host port and a device wired back to back in memory.
//!
//! Run with `cargo run --example loopback`.

use oatmeal::{Device, DeviceConfig, MemoryTransport, Msg, Port};

fn main() {
    let mut host = Port::new(MemoryTransport::new());

    let mut config = DeviceConfig::new("DemoBoard");
    config.instance_idx = 3;
    let mut board = Device::new(MemoryTransport::new(), config);

    // Host asks who is out there.
    let mut disr = Msg::new();
    {
        let token = host.next_token();
        disr.start("DIS", b'R', token);
    }
    disr.finish();
    host.send(&disr.as_view()).expect("in-memory write cannot fail");
    println!("host  -> {disr}");

    // Carry the bytes across and let the board answer its built-ins.
    let wire = host.transport_mut().take_outgoing();
    board.port_mut().transport_mut().push_incoming(&wire);
    assert!(board.check_for_msgs().is_none(), "discovery is handled internally");

    // Bring the reply back.
    let wire = board.port_mut().transport_mut().take_outgoing();
    host.transport_mut().push_incoming(&wire);

    let ack = host.recv_owned().expect("discovery ack should arrive");
    println!("board -> {ack}");

    let mut parser = ack.as_view().arg_parser();
    let mut role = [0u8; 32];
    let n = parser.parse_str(&mut role).expect("role string");
    let idx: u32 = parser.parse_arg().expect("instance index");
    println!(
        "discovered role={} instance={idx}",
        String::from_utf8_lossy(&role[..n])
    );
}
