use prometheus::core::Collector;
use prometheus::{Counter, Encoder, IntCounter, IntGauge, TextEncoder};
use std::sync::OnceLock;

static ACCOUNTS_REGISTERED: OnceLock<IntCounter> = OnceLock::new();
static SESSIONS_STARTED: OnceLock<IntCounter> = OnceLock::new();
static SESSIONS_STOPPED: OnceLock<IntCounter> = OnceLock::new();
static NBX_CLAIMED: OnceLock<Counter> = OnceLock::new();

static WITHDRAWALS_REQUESTED: OnceLock<IntCounter> = OnceLock::new();
static WITHDRAWALS_APPROVED: OnceLock<IntCounter> = OnceLock::new();
static WITHDRAWALS_REJECTED: OnceLock<IntCounter> = OnceLock::new();

static KYC_SUBMISSIONS: OnceLock<IntCounter> = OnceLock::new();
static STORAGE_ERRORS: OnceLock<IntCounter> = OnceLock::new();

static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();
static STORE_UP: OnceLock<IntGauge> = OnceLock::new();

fn accounts_registered() -> &'static IntCounter {
    ACCOUNTS_REGISTERED.get_or_init(|| {
        IntCounter::new("accounts_registered_total", "Total accounts registered").unwrap()
    })
}

fn sessions_started() -> &'static IntCounter {
    SESSIONS_STARTED.get_or_init(|| {
        IntCounter::new("mining_sessions_started_total", "Total mining sessions started").unwrap()
    })
}

fn sessions_stopped() -> &'static IntCounter {
    SESSIONS_STOPPED.get_or_init(|| {
        IntCounter::new("mining_sessions_stopped_total", "Total mining sessions claimed").unwrap()
    })
}

fn nbx_claimed() -> &'static Counter {
    NBX_CLAIMED.get_or_init(|| {
        Counter::new("nbx_claimed_total", "Total NBX settled into balances").unwrap()
    })
}

fn withdrawals_requested() -> &'static IntCounter {
    WITHDRAWALS_REQUESTED.get_or_init(|| {
        IntCounter::new("withdrawals_requested_total", "Total withdrawal requests accepted")
            .unwrap()
    })
}

fn withdrawals_approved() -> &'static IntCounter {
    WITHDRAWALS_APPROVED.get_or_init(|| {
        IntCounter::new("withdrawals_approved_total", "Total withdrawals approved").unwrap()
    })
}

fn withdrawals_rejected() -> &'static IntCounter {
    WITHDRAWALS_REJECTED.get_or_init(|| {
        IntCounter::new("withdrawals_rejected_total", "Total withdrawals rejected").unwrap()
    })
}

fn kyc_submissions() -> &'static IntCounter {
    KYC_SUBMISSIONS.get_or_init(|| {
        IntCounter::new("kyc_submissions_total", "Total KYC submissions received").unwrap()
    })
}

fn storage_errors() -> &'static IntCounter {
    STORAGE_ERRORS.get_or_init(|| {
        IntCounter::new("storage_errors_total", "Total store operation errors").unwrap()
    })
}

fn active_sessions() -> &'static IntGauge {
    ACTIVE_SESSIONS.get_or_init(|| {
        IntGauge::new("mining_sessions_active", "Currently open mining sessions").unwrap()
    })
}

fn store_up() -> &'static IntGauge {
    STORE_UP.get_or_init(|| IntGauge::new("store_up", "Platform store reachable (1/0)").unwrap())
}

pub fn inc_accounts_registered() {
    accounts_registered().inc();
}

pub fn inc_sessions_started() {
    sessions_started().inc();
    active_sessions().inc();
}

pub fn inc_sessions_stopped() {
    sessions_stopped().inc();
    active_sessions().dec();
}

pub fn add_nbx_claimed(amount: f64) {
    if amount > 0.0 {
        nbx_claimed().inc_by(amount);
    }
}

pub fn inc_withdrawals_requested() {
    withdrawals_requested().inc();
}

pub fn inc_withdrawals_approved() {
    withdrawals_approved().inc();
}

pub fn inc_withdrawals_rejected() {
    withdrawals_rejected().inc();
}

pub fn inc_kyc_submissions() {
    kyc_submissions().inc();
}

pub fn inc_storage_errors() {
    storage_errors().inc();
}

pub fn set_store_up(up: bool) {
    store_up().set(if up { 1 } else { 0 });
}

pub fn render() -> String {
    let enc = TextEncoder::new();
    let mut mfs = Vec::new();

    mfs.extend(accounts_registered().collect());
    mfs.extend(sessions_started().collect());
    mfs.extend(sessions_stopped().collect());
    mfs.extend(nbx_claimed().collect());
    mfs.extend(withdrawals_requested().collect());
    mfs.extend(withdrawals_approved().collect());
    mfs.extend(withdrawals_rejected().collect());
    mfs.extend(kyc_submissions().collect());
    mfs.extend(storage_errors().collect());
    mfs.extend(active_sessions().collect());
    mfs.extend(store_up().collect());

    let mut buf = Vec::new();
    let _ = enc.encode(&mfs, &mut buf);
    String::from_utf8_lossy(&buf).to_string()
}
