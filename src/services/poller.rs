use crate::{config::Config, error::AppResult, services::TemplateWriter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// 轮询器
///
/// 启动时立即执行一轮协调，之后按配置的间隔触发，收到终止信号后干净退出。
pub struct Poller {
    config: Arc<Config>,
    writer: TemplateWriter,
}

impl Poller {
    pub fn new(config: Arc<Config>, writer: TemplateWriter) -> Self {
        Self { config, writer }
    }

    /// 阻塞运行，直到收到终止信号
    pub async fn run(self) -> AppResult<()> {
        let reload = signal(SignalKind::hangup())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let shutdown = async move {
            tokio::select! {
                _ = terminate.recv() => info!("收到终止信号，正在退出..."),
                _ = tokio::signal::ctrl_c() => info!("收到中断信号，正在退出..."),
            }
        };

        self.run_until(shutdown, reload).await
    }

    /// 主循环：启动先执行一轮，之后每个tick执行一轮，shutdown完成时退出
    ///
    /// 协调失败只记录日志，轮询本身不会因此退出；
    /// 各轮协调串行执行，不会重叠。
    pub(crate) async fn run_until<F>(mut self, shutdown: F, mut reload: Signal) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!("正在轮询AWS...");
        if let Err(e) = self.writer.write_template().await {
            error!("本轮协调失败: {}", e);
        }

        let mut ticker = interval(Duration::from_secs(self.config.polling_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval的首个tick立即完成，启动时已经执行过一轮，这里直接消费掉
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("正在轮询AWS...");
                    if let Err(e) = self.writer.write_template().await {
                        error!("本轮协调失败: {}", e);
                    }
                }
                _ = reload.recv() => {
                    // TODO 配置热重载：目前收到SIGHUP只记录日志
                    info!("收到重载信号，配置热重载尚未实现");
                }
                _ = &mut shutdown => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{Instance, InventoryLookup};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// 记录查询次数的策略，用查询次数反推协调轮数
    struct CountingLookup {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl InventoryLookup for CountingLookup {
        async fn lookup(&self) -> AppResult<Vec<Instance>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn test_config(dir: &Path) -> Arc<Config> {
        Arc::new(Config {
            polling_seconds: 1,
            source: dir.join("conf.tmpl").to_str().unwrap().to_string(),
            destination: dir.join("conf.out").to_str().unwrap().to_string(),
            command: None,
            check: None,
            services: HashMap::new(),
        })
    }

    fn counting_poller(dir: &Path) -> (Poller, Arc<AtomicUsize>) {
        std::fs::write(
            dir.join("conf.tmpl"),
            r#"{% for i in lookupService("web") %}{{ i.id }}{% endfor %}"#,
        )
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let lookups: HashMap<String, Arc<dyn InventoryLookup>> = HashMap::from([(
            "web".to_string(),
            Arc::new(CountingLookup {
                calls: Arc::clone(&calls),
            }) as Arc<dyn InventoryLookup>,
        )]);

        let config = test_config(dir);
        let writer = TemplateWriter::with_lookups(Arc::clone(&config), lookups);
        (Poller::new(config, writer), calls)
    }

    #[tokio::test]
    async fn test_startup_pass_runs_before_first_tick() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, calls) = counting_poller(dir.path());
        let reload = signal(SignalKind::hangup()).unwrap();

        // shutdown立即就绪：只应执行启动那一轮
        poller.run_until(async {}, reload).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_pass_per_tick() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, calls) = counting_poller(dir.path());
        let reload = signal(SignalKind::hangup()).unwrap();

        // 间隔1秒，运行1.5秒：启动一轮加首个tick一轮，恰好两轮
        poller
            .run_until(sleep(Duration::from_millis(1500)), reload)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pass_errors_do_not_stop_polling() {
        let dir = tempfile::tempdir().unwrap();
        let (poller, calls) = counting_poller(dir.path());
        // 模板被删除后每轮协调都失败，但轮询照常进行并正常退出
        std::fs::remove_file(dir.path().join("conf.tmpl")).unwrap();
        let reload = signal(SignalKind::hangup()).unwrap();

        poller
            .run_until(sleep(Duration::from_millis(1500)), reload)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
