use super::*;

#[tokio::test]
async fn notices_keep_flowing_after_the_printer_falls_behind() {
    let (tx, rx) = broadcast::channel(2);
    for _ in 0..5 {
        tx.send(SessionEvent::Exhausted).expect("send");
    }
    drop(tx);

    let mut seen = 0;
    forward_notices(rx, |_| seen += 1).await;

    // three events were overwritten; the two still buffered are delivered
    assert_eq!(seen, 2);
}
