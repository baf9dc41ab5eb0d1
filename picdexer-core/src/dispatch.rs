use tokio::sync::mpsc;

use crate::browse::Task;
use crate::context::PipelineContext;

/// Duplicates every task into the metadata and binary branches.
///
/// Both outputs close when the input closes; on cancellation the loop
/// returns promptly. A task reaches both branches or neither.
pub async fn dispatch_tasks(
    ctx: &PipelineContext,
    mut input: mpsc::Receiver<Task>,
    meta_out: mpsc::Sender<Task>,
    bin_out: mpsc::Sender<Task>,
) {
    loop {
        tokio::select! {
            _ = ctx.cancel_token().cancelled() => return,
            task = input.recv() => {
                let Some(task) = task else { return };
                if meta_out.send(task.clone()).await.is_err() {
                    return;
                }
                if bin_out.send(task).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn task(name: &str) -> Task {
        Task {
            path: PathBuf::from(name),
            file_name: name.to_string(),
            file_size: 42,
            modified: SystemTime::UNIX_EPOCH,
            file_id: format!("id_{name}"),
        }
    }

    #[tokio::test]
    async fn every_task_reaches_both_branches() {
        let ctx = PipelineContext::new("test");
        let (in_tx, in_rx) = mpsc::channel(4);
        let (meta_tx, mut meta_rx) = mpsc::channel(4);
        let (bin_tx, mut bin_rx) = mpsc::channel(4);

        let dispatcher = tokio::spawn(async move {
            dispatch_tasks(&ctx, in_rx, meta_tx, bin_tx).await;
        });

        in_tx.send(task("a.jpg")).await.expect("send a");
        in_tx.send(task("b.jpg")).await.expect("send b");
        drop(in_tx);
        dispatcher.await.expect("dispatcher");

        let mut meta = Vec::new();
        while let Some(t) = meta_rx.recv().await {
            meta.push(t.file_id);
        }
        let mut bin = Vec::new();
        while let Some(t) = bin_rx.recv().await {
            bin.push(t.file_id);
        }
        assert_eq!(meta, vec!["id_a.jpg", "id_b.jpg"]);
        assert_eq!(bin, vec!["id_a.jpg", "id_b.jpg"]);
    }

    #[tokio::test]
    async fn outputs_close_when_input_closes() {
        let ctx = PipelineContext::new("test");
        let (in_tx, in_rx) = mpsc::channel::<Task>(1);
        let (meta_tx, mut meta_rx) = mpsc::channel(1);
        let (bin_tx, mut bin_rx) = mpsc::channel(1);

        drop(in_tx);
        dispatch_tasks(&ctx, in_rx, meta_tx, bin_tx).await;

        assert!(meta_rx.recv().await.is_none());
        assert!(bin_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn bounded_queues_block_instead_of_dropping() {
        let ctx = PipelineContext::new("test");
        let (in_tx, in_rx) = mpsc::channel(1);
        let (meta_tx, mut meta_rx) = mpsc::channel(1);
        let (bin_tx, mut bin_rx) = mpsc::channel(1);

        let dispatcher = tokio::spawn(async move {
            dispatch_tasks(&ctx, in_rx, meta_tx, bin_tx).await;
        });
        let producer = tokio::spawn(async move {
            for i in 0..32 {
                in_tx.send(task(&format!("{i}.jpg"))).await.expect("send");
            }
        });
        let meta = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(t) = meta_rx.recv().await {
                seen.push(t.file_id);
            }
            seen
        });
        let bin = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(t) = bin_rx.recv().await {
                seen.push(t.file_id);
            }
            seen
        });

        producer.await.expect("producer");
        dispatcher.await.expect("dispatcher");
        let expected: Vec<String> = (0..32).map(|i| format!("id_{i}.jpg")).collect();
        assert_eq!(meta.await.expect("meta"), expected);
        assert_eq!(bin.await.expect("bin"), expected);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let ctx = PipelineContext::new("test");
        let (_in_tx, in_rx) = mpsc::channel::<Task>(1);
        let (meta_tx, _meta_rx) = mpsc::channel(1);
        let (bin_tx, _bin_rx) = mpsc::channel(1);

        ctx.cancel();
        // Returns instead of blocking on the open, empty input.
        dispatch_tasks(&ctx, in_rx, meta_tx, bin_tx).await;
    }
}
