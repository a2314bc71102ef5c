use meshnow_node::run_demo;

#[tokio::test]
async fn demo_provisions_and_flashes_every_responder() {
    let data_dir = std::env::temp_dir().join(format!("meshnow-demo-test-{}", std::process::id()));
    let image_size = 2_000u32;

    let report = run_demo(2, image_size, data_dir.clone()).await;

    assert_eq!(report.handshake.successed.len(), 2);
    assert_eq!(report.ota.successed.len() + report.ota.unfinished.len(), 2);
    assert_eq!(report.responder_shas.len(), 2);

    let expected_sha = meshnow_ota::image_sha256(&(0..image_size).map(|i| i as u8).collect::<Vec<u8>>());
    for (_, sha) in &report.responder_shas {
        assert_eq!(*sha, expected_sha);
    }

    let _ = std::fs::remove_dir_all(&data_dir);
}
