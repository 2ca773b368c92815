/// Guard running a closure when dropped, unless cancelled.
pub struct Deferred<F>
where
    F: FnOnce(),
{
    f: Option<F>,
}

impl<F> Deferred<F>
where
    F: FnOnce(),
{
    /// Drops the closure without running it.
    pub fn cancel(mut self) {
        self.f.take();
    }
}

impl<F> Drop for Deferred<F>
where
    F: FnOnce(),
{
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

pub fn defer<F>(f: F) -> Deferred<F>
where
    F: FnOnce(),
{
    Deferred { f: Some(f) }
}

/// Runs the given statements when the enclosing scope exits.
#[macro_export]
macro_rules! defer {
    ($e:expr) => {
        let _defer = $crate::defer(|| $e);
    };
    ($($data: tt)*) => {
        $crate::defer!({ $($data)* });
    };
}
