#![no_main]

use darkstar_query::core::ping_info::PingInfo;
use darkstar_query::registry::MasterDirectory;
use darkstar_query::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // decoder and both payload parsers must reject garbage without panicking
    if let Ok(packet) = Packet::decode(data) {
        let mut dir = MasterDirectory::default();
        let _ = dir.merge_packet(&packet, true);
        let _ = PingInfo::from_packet(&packet);
    }
});
