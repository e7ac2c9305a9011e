//! 消息搜索
//!
//! 输入防抖后再请求；新的查询会取消尚未完成的旧查询，避免旧结果覆盖新结果。
//! 空查询不发请求，直接把结果清空。

use crate::im::backend::ChatBackend;
use crate::im::conversation::types::ConversationTarget;
use crate::im::listener::ChatListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

pub struct MessageSearch {
    backend: Arc<dyn ChatBackend>,
    debounce: Duration,
    inflight: Mutex<Option<JoinHandle<()>>>,
}

impl MessageSearch {
    pub fn new(backend: Arc<dyn ChatBackend>, debounce: Duration) -> Self {
        Self {
            backend,
            debounce,
            inflight: Mutex::new(None),
        }
    }

    /// 提交查询，结果通过监听器回调
    pub async fn search(
        &self,
        listener: Arc<dyn ChatListener>,
        target: Option<ConversationTarget>,
        query: &str,
    ) {
        let query = query.trim().to_string();
        {
            let mut slot = self.inflight.lock().await;
            if let Some(previous) = slot.take() {
                previous.abort();
            }
            if !query.is_empty() {
                let backend = self.backend.clone();
                let debounce = self.debounce;
                *slot = Some(tokio::spawn(async move {
                    tokio::time::sleep(debounce).await;
                    debug!("[Search] 🔍 查询: {}", query);
                    match backend.search_messages(target.as_ref(), &query).await {
                        Ok(results) => listener.on_search_results(query, results).await,
                        Err(e) => {
                            warn!("[Search] 搜索失败: {}", e);
                            listener.on_search_failed(query, e.to_string()).await;
                        }
                    }
                }));
                return;
            }
        }
        debug!("[Search] 空查询，清空结果");
        listener.on_search_results(String::new(), Vec::new()).await;
    }

    /// 取消未完成的查询
    pub async fn cancel(&self) {
        if let Some(handle) = self.inflight.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::testing::{FakeBackend, RecordingListener};

    fn setup() -> (Arc<FakeBackend>, Arc<RecordingListener>, MessageSearch) {
        let backend = Arc::new(FakeBackend::default());
        let listener = Arc::new(RecordingListener::default());
        let search = MessageSearch::new(backend.clone(), DEFAULT_SEARCH_DEBOUNCE);
        (backend, listener, search)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_query_clears_results_without_request() {
        let (backend, listener, search) = setup();
        search.search(listener.clone(), None, "   ").await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.count("search:"), 0);
        assert_eq!(listener.searches(), vec![(String::new(), 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_typing_only_sends_last_query() {
        let (backend, listener, search) = setup();
        for q in ["h", "he", "hel", "hello"] {
            search.search(listener.clone(), None, q).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.calls(), vec!["search:hello".to_string()]);
        assert_eq!(listener.searches(), vec![("hello".to_string(), 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn new_query_cancels_in_flight_request() {
        let (backend, listener, search) = setup();
        *backend.search_delay.lock().unwrap() = Duration::from_secs(2);

        search.search(listener.clone(), None, "old").await;
        // 防抖结束，请求已发出但尚未返回
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(backend.count("search:old"), 1);

        search.search(listener.clone(), None, "").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(listener.searches(), vec![(String::new(), 0)]);
    }
}
