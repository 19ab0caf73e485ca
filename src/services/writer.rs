use crate::{
    config::{Config, ServiceConfig},
    error::{AppError, AppResult},
    lookup::{ElbLookup, Instance, InventoryLookup, SearchLookup},
    services::executor,
};
use minijinja::{Environment, ErrorKind, Value, context};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// 模板写出器
///
/// 每轮协调：渲染模板 → 比对摘要 → （有变化时）校验 → 写出 → 重载。
/// 上一轮渲染结果的md5摘要是唯一的跨轮可变状态，由写出器独占持有。
pub struct TemplateWriter {
    config: Arc<Config>,
    lookups: HashMap<String, Arc<dyn InventoryLookup>>,
    last_run_md5: [u8; 16],
}

impl TemplateWriter {
    /// 按配置为每个服务创建AWS查询策略
    pub async fn new(config: Arc<Config>) -> Self {
        let mut lookups: HashMap<String, Arc<dyn InventoryLookup>> = HashMap::new();
        for (name, service) in &config.services {
            let lookup: Arc<dyn InventoryLookup> = match service {
                ServiceConfig::Elb { elb } => Arc::new(ElbLookup::new(elb.clone()).await),
                ServiceConfig::Search { search } => {
                    Arc::new(SearchLookup::new(search.clone()).await)
                }
            };
            lookups.insert(name.clone(), lookup);
        }
        Self::with_lookups(config, lookups)
    }

    /// 用现成的查询策略创建写出器
    pub fn with_lookups(
        config: Arc<Config>,
        lookups: HashMap<String, Arc<dyn InventoryLookup>>,
    ) -> Self {
        Self {
            config,
            lookups,
            last_run_md5: [0; 16],
        }
    }

    /// 执行一轮协调
    ///
    /// 渲染结果与上一轮相同时直接返回，不校验、不写出、不重载。
    /// 摘要在校验与写出之前就地更新且失败不回滚，避免模板持续损坏时每轮热循环重试。
    pub async fn write_template(&mut self) -> AppResult<()> {
        let rendered = self.render().await?;

        let checksum = md5::compute(&rendered).0;
        if checksum == self.last_run_md5 {
            info!("渲染结果无变化，本轮不写出文件");
            return Ok(());
        }
        debug!("渲染结果摘要变为 {}", hex::encode(checksum));
        self.last_run_md5 = checksum;

        self.check_config(&rendered).await?;

        tokio::fs::write(&self.config.destination, &rendered)
            .await
            .map_err(|e| {
                error!("写出文件 {} 失败: {}", self.config.destination, e);
                AppError::Io(e)
            })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(
                &self.config.destination,
                std::fs::Permissions::from_mode(0o644),
            )
            .await?;
        }
        info!("已写出文件 {}", self.config.destination);

        self.reload_service().await;
        Ok(())
    }

    /// 加载模板并渲染为字节序列
    ///
    /// 模板每轮重新从磁盘读取；渲染前先解析模板实际引用的服务，
    /// 任何查询失败、模板解析失败或引用未知服务都会中止本轮。
    async fn render(&self) -> AppResult<Vec<u8>> {
        debug!("正在从 {} 加载模板", self.config.source);
        let source = tokio::fs::read_to_string(&self.config.source).await?;

        let requested = collect_service_names(&source)?;
        let mut resolved: HashMap<String, Vec<Instance>> = HashMap::new();
        for (name, lookup) in &self.lookups {
            if !requested.contains(name) {
                continue;
            }
            debug!("正在查询服务 {}", name);
            resolved.insert(name.clone(), lookup.lookup().await?);
        }
        let services = Arc::new(resolved);

        let mut env = Environment::new();
        env.add_template("conf", &source)?;
        env.add_function(
            "lookupService",
            move |name: String| -> Result<Value, minijinja::Error> {
                match services.get(&name) {
                    Some(instances) => Ok(Value::from_serialize(instances)),
                    None => {
                        error!("未找到名为 {} 的服务", name);
                        Err(minijinja::Error::new(
                            ErrorKind::InvalidOperation,
                            format!("未找到名为 {} 的服务", name),
                        ))
                    }
                }
            },
        );

        let rendered = env.get_template("conf")?.render(context! {}).map_err(|e| {
            error!("渲染模板 {} 失败: {}", self.config.source, e);
            AppError::Template(e)
        })?;
        Ok(rendered.into_bytes())
    }

    /// 用配置的校验命令检查渲染结果
    ///
    /// 渲染结果写入临时文件，命令中的 `{}` 替换为该文件路径；
    /// 校验失败时中止本轮，不写出目标文件。
    async fn check_config(&self, rendered: &[u8]) -> AppResult<()> {
        let Some(check) = &self.config.check else {
            return Ok(());
        };

        let temp_file = NamedTempFile::new()?;
        tokio::fs::write(temp_file.path(), rendered).await?;
        let command = match temp_file.path().to_str() {
            Some(path) => check.replace("{}", path),
            None => check.clone(),
        };

        info!("正在使用命令校验配置: {}", command);
        if !executor::execute_task(&command).await {
            error!("配置校验未通过，不写出文件 {}", self.config.destination);
            return Err(AppError::check(format!("校验命令 {} 报告配置无效", check)));
        }
        Ok(())
    }

    /// 用配置的重载命令通知下游服务
    ///
    /// 文件已经写出，重载结果只记录日志，不影响本轮协调的结果。
    async fn reload_service(&self) {
        let Some(command) = &self.config.command else {
            return;
        };

        info!("正在使用命令重载服务: {}", command);
        if executor::execute_task(command).await {
            info!("重载命令执行成功");
        } else {
            warn!("重载命令执行出错");
        }
    }
}

/// 预渲染一遍模板，收集其中lookupService实际引用的服务名
///
/// 预渲染提供的实例列表为空，渲染本身的失败忽略，只保留收集到的名称；
/// 模板语法错误仍会中止本轮。未被引用的服务在正式渲染前不会被查询。
fn collect_service_names(source: &str) -> AppResult<HashSet<String>> {
    let mut env = Environment::new();
    env.add_template("conf", source)?;

    let requested = Arc::new(Mutex::new(HashSet::new()));
    let recorder = Arc::clone(&requested);
    env.add_function("lookupService", move |name: String| -> Value {
        recorder.lock().unwrap().insert(name);
        Value::from_serialize(Vec::<Instance>::new())
    });

    let _ = env.get_template("conf")?.render(context! {});

    let names = requested.lock().unwrap().clone();
    Ok(names)
}
