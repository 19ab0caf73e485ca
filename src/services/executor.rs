use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// 外部命令的执行状态，Pending是唯一的非终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Error,
    Complete,
}

/// 通过shell执行外部命令，成功结束时返回true
///
/// 命令字符串交给 `bash -c` 解释，因此可以包含管道、重定向等shell语法。
/// 标准输出与标准错误逐行转发到日志，全部输出与进程退出都完成后才返回。
pub async fn execute_task(command: &str) -> bool {
    let (tx, mut rx) = mpsc::channel(64);
    let status_handle = tokio::spawn(run_command(command.to_string(), tx));

    while let Some(line) = rx.recv().await {
        info!("{}", line);
    }

    match status_handle.await {
        Ok(status) => status == TaskStatus::Complete,
        Err(e) => {
            error!("命令执行任务意外中止: {}", e);
            false
        }
    }
}

/// 启动子进程、排空两条输出流并等待退出
///
/// 两条输出流由独立任务排空并写入同一个通道，子进程不会因输出缓冲区写满而阻塞。
pub(crate) async fn run_command(command: String, tx: mpsc::Sender<String>) -> TaskStatus {
    let mut child = match Command::new("bash")
        .arg("-c")
        .arg(&command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("启动命令失败: {}", e);
            return TaskStatus::Error;
        }
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        warn!("读取命令输出管道失败");
        let _ = child.start_kill();
        return TaskStatus::Error;
    };

    let out_drain = tokio::spawn(read_pipe_output(stdout, tx.clone(), "out > "));
    let err_drain = tokio::spawn(read_pipe_output(stderr, tx, "err > "));

    let wait_result = child.wait().await;
    let _ = out_drain.await;
    let _ = err_drain.await;

    match wait_result {
        Ok(exit) if exit.success() => TaskStatus::Complete,
        Ok(exit) => {
            match exit.code() {
                Some(code) => error!("命令退出码: {}", code),
                None => error!("命令被信号终止: {}", exit),
            }
            TaskStatus::Error
        }
        Err(e) => {
            error!("等待命令结束时发生未知错误: {}", e);
            TaskStatus::Error
        }
    }
}

/// 逐行读取输出管道，非空行加上流前缀后送入通道
async fn read_pipe_output<R>(pipe: R, tx: mpsc::Sender<String>, prefix: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if tx.send(format!("{}{}", prefix, trimmed)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 执行命令并收集全部输出行，供断言使用
    async fn run_and_collect(command: &str) -> (TaskStatus, Vec<String>) {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_command(command.to_string(), tx));

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }

        (handle.await.unwrap(), lines)
    }

    #[tokio::test]
    async fn test_zero_exit_is_complete() {
        assert!(execute_task("true").await);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        assert!(!execute_task("exit 3").await);
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        assert!(!execute_task("/nonexistent/fleetconf-test-program").await);
    }

    #[tokio::test]
    async fn test_shell_syntax_supported() {
        assert!(execute_task("echo hello | grep -q hello").await);
    }

    #[tokio::test]
    async fn test_both_streams_fully_drained() {
        let (status, lines) = run_and_collect("seq 1 200; seq 201 300 1>&2").await;

        assert_eq!(status, TaskStatus::Complete);
        let out_count = lines.iter().filter(|l| l.starts_with("out > ")).count();
        let err_count = lines.iter().filter(|l| l.starts_with("err > ")).count();
        assert_eq!(out_count, 200);
        assert_eq!(err_count, 100);
    }

    #[tokio::test]
    async fn test_lopsided_output_does_not_deadlock() {
        // 一条流远多于另一条，也不能阻塞或丢行
        let (status, lines) = run_and_collect("seq 1 5000; echo lonely 1>&2").await;

        assert_eq!(status, TaskStatus::Complete);
        let out_count = lines.iter().filter(|l| l.starts_with("out > ")).count();
        assert_eq!(out_count, 5000);
        assert!(lines.contains(&"err > lonely".to_string()));
    }

    #[tokio::test]
    async fn test_failed_command_output_still_drained() {
        let (status, lines) = run_and_collect("echo before; exit 7").await;

        assert_eq!(status, TaskStatus::Error);
        assert!(lines.contains(&"out > before".to_string()));
    }

    #[tokio::test]
    async fn test_empty_lines_skipped() {
        let (_, lines) = run_and_collect("echo first; echo; echo last").await;

        assert_eq!(
            lines,
            vec!["out > first".to_string(), "out > last".to_string()]
        );
    }
}
