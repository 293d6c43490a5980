#![no_main]

use libfuzzer_sys::fuzz_target;
use room_sync_client::protocol::ServerFrame;
use room_sync_client::RoomStateStore;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    let _ = serde_json::from_slice::<ServerFrame>(data);

    // Decoded STATE patches must merge (or be dropped) without panicking.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(ServerFrame::State(patch)) = serde_json::from_str::<ServerFrame>(s) {
            let store = RoomStateStore::new();
            store.apply_patch(&patch);
            store.apply_patch(&patch);
            let _ = store.snapshot();
        }
    }
});
