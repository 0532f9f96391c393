/// Outstanding-work counters of one discovery run.
///
/// Discovery is complete when every service listing and every characteristic
/// listing has finished. The completion test runs after each decrement, and
/// the `done` latch makes it fire exactly once regardless of which kind of
/// step finishes last.
#[derive(Debug, Default)]
pub(super) struct Tracker {
    svc: usize,
    chr: usize,
    desc: usize,
    started: bool,
    done: bool,
}

impl Tracker {
    /// Starts tracking `n` services. Returns whether discovery is complete,
    /// which is the case when there are no services.
    pub fn start(&mut self, n: usize) -> bool {
        debug_assert!(!self.started, "discovery already started");
        self.started = true;
        self.svc = n;
        self.check()
    }

    /// Adds `n` pending characteristics.
    #[inline]
    pub fn add_chars(&mut self, n: usize) {
        self.chr += n;
    }

    /// Records `n` discovered descriptors.
    #[inline]
    pub fn add_descs(&mut self, n: usize) {
        self.desc += n;
    }

    /// Marks one service listing as finished. Returns whether this completed
    /// discovery.
    pub fn service_done(&mut self) -> bool {
        debug_assert!(self.svc > 0, "service counter underflow");
        self.svc = self.svc.saturating_sub(1);
        self.check()
    }

    /// Marks one characteristic listing as finished. Returns whether this
    /// completed discovery.
    pub fn char_done(&mut self) -> bool {
        debug_assert!(self.chr > 0, "characteristic counter underflow");
        self.chr = self.chr.saturating_sub(1);
        self.check()
    }

    /// Returns the number of discovered descriptors.
    #[inline(always)]
    pub const fn descriptors(&self) -> usize {
        self.desc
    }

    /// Returns whether discovery is complete.
    #[inline(always)]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    fn check(&mut self) -> bool {
        if self.done || !self.started || self.svc != 0 || self.chr != 0 {
            return false;
        }
        self.done = true;
        true
    }
}
