//! # 固定大小的工作线程池
//!
//! 工作线程共享一个 FIFO 任务队列，由互斥锁与条件变量保护。
//!
//! ## 停机策略
//! - `stop()` 之后不再接受新任务，`submit` 返回 `PoolStopped`。
//! - 已入队但尚未执行的任务仍会被执行完毕，不会被静默丢弃。
//! - 每个工作线程执行完当前任务、且队列为空后退出；`stop()` 等待全部线程结束。

use crate::exception::Exception;
use log::{debug, error, info};
use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: VecDeque<Task>,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    active: AtomicUsize,
}

impl Shared {
    /// 任务在锁外执行且 panic 会被捕获，锁中毒时的队列状态依然一致，可以直接恢复
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    /// 创建含 `size` 个工作线程的线程池，`size` 为 0 时使用 CPU 核心数。
    pub fn new(size: usize) -> Result<Self, Exception> {
        let size = if size == 0 { num_cpus::get() } else { size };
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                stopping: false,
            }),
            available: Condvar::new(),
            active: AtomicUsize::new(0),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(size)),
            size,
        };
        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || worker_loop(index, shared));
            match spawned {
                Ok(handle) => pool.lock_workers().push(handle),
                Err(e) => {
                    error!("无法创建工作线程{}：{}", index, e);
                    // 已创建的线程随 pool 的析构一起停止
                    return Err(Exception::WorkerSpawn(e));
                }
            }
        }
        info!("线程池已启动，工作线程数：{}", size);
        Ok(pool)
    }

    /// 提交一个任务。线程池停止后返回 `PoolStopped`，任务随之被析构。
    pub fn submit<F>(&self, task: F) -> Result<(), Exception>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.shared.lock();
            if queue.stopping {
                return Err(Exception::PoolStopped);
            }
            queue.tasks.push_back(Box::new(task));
        }
        self.shared.available.notify_one();
        Ok(())
    }

    /// 停止接受新任务，执行完队列中剩余的任务后回收全部工作线程。重复调用无副作用。
    ///
    /// 不能在工作线程内部调用，否则会等待自身结束。
    pub fn stop(&self) {
        {
            let mut queue = self.shared.lock();
            if !queue.stopping {
                info!("线程池开始停机，剩余排队任务：{}", queue.tasks.len());
            }
            queue.stopping = true;
        }
        self.shared.available.notify_all();

        let handles: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("工作线程异常退出");
            }
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 正在执行的任务数
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// 排队等待的任务数
    pub fn queued_count(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.lock().stopping
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(index: usize, shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.lock();
            while queue.tasks.is_empty() && !queue.stopping {
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            match queue.tasks.pop_front() {
                Some(task) => task,
                // 队列为空且已停机
                None => break,
            }
        };

        shared.active.fetch_add(1, Ordering::SeqCst);
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("工作线程{}执行的任务发生panic，线程继续运行", index);
        }
        shared.active.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("工作线程{}退出", index);
}
