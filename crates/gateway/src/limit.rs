//! # バイト上限トランスフォーム
//!
//! リクエストボディのストリームをラップし、累積バイト数が上限を超えた
//! 瞬間にエラーを発生させる。超過を跨ぐチャンクは下流へ転送されない。
//! エラーは `StreamReader` 経由でストレージ書き込みを中断させ、
//! 上流の読み取りも打ち切られる。準備フェーズの宣言サイズは信頼しない。

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

/// 上限超過時にストリームへ流すエラーメッセージ。
const CEILING_MESSAGE: &str = "byte ceiling exceeded";

/// バイト上限付きストリーム。
pub struct ByteCeiling<S> {
    inner: S,
    limit: u64,
    seen: u64,
    tripped: Arc<AtomicBool>,
}

impl<S> ByteCeiling<S> {
    /// 上限`limit`バイトでストリームをラップする。
    pub fn new(inner: S, limit: u64) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 上限超過が起きたかを後から判定するためのフラグ。
    /// ストレージ書き込み失敗を413と502に振り分けるのに使う。
    pub fn tripped(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.tripped)
    }
}

impl<S> Stream for ByteCeiling<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.seen += chunk.len() as u64;
                if this.seen > this.limit {
                    this.tripped.store(true, Ordering::SeqCst);
                    Poll::Ready(Some(Err(io::Error::other(CEILING_MESSAGE))))
                } else {
                    Poll::Ready(Some(Ok(chunk)))
                }
            }
            other => other,
        }
    }
}
