#![no_main]
use calldata_pack::*;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut registry = RegistrySnapshot::default();
    registry.tier1 = vec![vec![0x5a; 20], vec![0; 4]];
    registry.tier2 = vec![vec![0xff; 32]];
    registry.function_selectors = vec![vec![0xa9, 0x05, 0x9c, 0xbb]];
    let mut store = DictionaryStore::new(RegistryExpectations::new(0, [0; 20]));
    if futures_executor::block_on(store.sync(&registry)).is_err() {
        return;
    }

    let stream = ByteStreamCodec::new(&store, EncodeOptions::default());
    if let Ok(decoded) = stream.decode(data) {
        assert_eq!(stream.decode(&stream.encode(&decoded)).unwrap(), decoded);
    }

    let codec = SolutionCodec::new(store.clone());
    if let Ok(solution) = codec.decompress(data) {
        if let Ok(again) = codec.compress(&solution) {
            assert_eq!(codec.decompress(&again).unwrap(), solution);
        }
    }
    if let Ok(call) = codec.decompress_call(data) {
        if let Ok(again) = codec.compress_call(&call) {
            assert_eq!(codec.decompress_call(&again).unwrap(), call);
        }
    }
    let chunks = decompose(data, codec.signatures());
    assert_eq!(chunks.iter().map(|c| c.bytes().len()).sum::<usize>(), data.len());
});
