//! Shared fixtures for the integration tests.
//!
//! The provider stub stands in for the JavaScript engine: it exports a
//! memory, a bump allocator, and an evaluation entry point that does nothing.
//!
//! The counter guest keeps one `u64` counter per 3-byte key. It reads the
//! call envelope from stdin, base64-decodes the three fields, runs the
//! operation named by the payload, and writes the result envelope to stdout.
//!
//! Payload layout (12 bytes): `op`, 3 key bytes, little-endian `u64` argument.
//! State layout: 12-byte entries of 3 key bytes, one pad byte, `u64` counter.
//!
//! | op  | effect                                              |
//! |-----|-----------------------------------------------------|
//! | 0   | add the argument to the actor's counter             |
//! | 1   | nothing                                             |
//! | 2   | return the key's counter (key, 0, `u64`)            |
//! | 3   | spin for the low 32 bits of the argument iterations |
//! | 4   | grow memory by the argument's pages                 |
//! | 5   | report failure                                      |
//! | 6   | write output that is not JSON                       |
//! | 7+  | report an unknown operation                         |

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use polyglot_runtime_common::{EngineConfig, ExecutionConfig};
use polyglot_runtime_core::{ExecutionRequest, Executor, ProviderCache};

pub const OP_INCREMENT: u8 = 0;
pub const OP_NOOP: u8 = 1;
pub const OP_GET: u8 = 2;
pub const OP_SPIN: u8 = 3;
pub const OP_GROW: u8 = 4;
pub const OP_FAIL: u8 = 5;
pub const OP_GARBAGE: u8 = 6;

pub const PROVIDER_WAT: &str = r#"
(module
    (memory (export "memory") 1)
    (global $heap (mut i32) (i32.const 1024))

    (func (export "canonical_abi_realloc")
        (param i32 i32 i32 i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get 3)))
        (local.get $ptr))

    (func (export "eval_bytecode") (param i32 i32))
)
"#;

pub const COUNTER_GUEST_WAT: &str = r#"
(module
    (import "javy_quickjs_provider_v1" "canonical_abi_realloc"
        (func $realloc (param i32 i32 i32 i32) (result i32)))
    (import "wasi_snapshot_preview1" "fd_read"
        (func $fd_read (param i32 i32 i32 i32) (result i32)))
    (import "wasi_snapshot_preview1" "fd_write"
        (func $fd_write (param i32 i32 i32 i32) (result i32)))

    (memory (export "memory") 1)

    ;; 0..28     iovec scratch
    ;; 64        base64 alphabet
    ;; 256..512  envelope fragments
    ;; 1024      quote offsets
    ;; 4096      raw input
    ;; 20480     decoded state
    ;; 28672     decoded payload
    ;; 29696     decoded actor
    ;; 29760     result
    ;; 32768     output
    (data (i32.const 64) "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/")
    (data (i32.const 256) "{\"result\":\"")
    (data (i32.const 288) "\",\"success\":true,\"endState\":\"")
    (data (i32.const 320) "\",\"error\":\"\"}")
    (data (i32.const 352) "{\"success\":false,\"error\":\"unknown operation\"}")
    (data (i32.const 400) "{\"success\":false,\"error\":\"requested failure\"}")
    (data (i32.const 448) "not json")
    (data (i32.const 464) "counter guest\n")

    (global $state_len (mut i32) (i32.const 0))
    (global $payload_len (mut i32) (i32.const 0))
    (global $actor_len (mut i32) (i32.const 0))
    (global $result_len (mut i32) (i32.const 0))

    (func $write (param $fd i32) (param $ptr i32) (param $len i32)
        (block $done
            (loop $more
                (br_if $done (i32.eqz (local.get $len)))
                (i32.store (i32.const 16) (local.get $ptr))
                (i32.store (i32.const 20)
                    (select (local.get $len) (i32.const 4096)
                        (i32.lt_u (local.get $len) (i32.const 4096))))
                (br_if $done
                    (call $fd_write (local.get $fd) (i32.const 16) (i32.const 1) (i32.const 24)))
                (br_if $done (i32.eqz (i32.load (i32.const 24))))
                (local.set $ptr (i32.add (local.get $ptr) (i32.load (i32.const 24))))
                (local.set $len (i32.sub (local.get $len) (i32.load (i32.const 24))))
                (br $more))))

    (func $read_input (result i32)
        (local $total i32)
        (local $n i32)
        (block $done
            (loop $more
                (i32.store (i32.const 0) (i32.add (i32.const 4096) (local.get $total)))
                (i32.store (i32.const 4) (i32.sub (i32.const 16384) (local.get $total)))
                (br_if $done (i32.eqz (i32.load (i32.const 4))))
                (br_if $done
                    (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
                (local.set $n (i32.load (i32.const 8)))
                (br_if $done (i32.eqz (local.get $n)))
                (local.set $total (i32.add (local.get $total) (local.get $n)))
                (br $more)))
        (local.get $total))

    (func $scan_quotes (param $len i32) (result i32)
        (local $i i32)
        (local $count i32)
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                (if (i32.eq (i32.load8_u (i32.add (i32.const 4096) (local.get $i))) (i32.const 34))
                    (then
                        (if (i32.lt_u (local.get $count) (i32.const 16))
                            (then
                                (i32.store
                                    (i32.add (i32.const 1024) (i32.shl (local.get $count) (i32.const 2)))
                                    (local.get $i))))
                        (local.set $count (i32.add (local.get $count) (i32.const 1)))))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $next)))
        (local.get $count))

    (func $quote (param $idx i32) (result i32)
        (i32.load (i32.add (i32.const 1024) (i32.shl (local.get $idx) (i32.const 2)))))

    (func $dec (param $c i32) (result i32)
        (if (result i32)
            (i32.and (i32.ge_u (local.get $c) (i32.const 65)) (i32.le_u (local.get $c) (i32.const 90)))
            (then (i32.sub (local.get $c) (i32.const 65)))
            (else
                (if (result i32)
                    (i32.and (i32.ge_u (local.get $c) (i32.const 97)) (i32.le_u (local.get $c) (i32.const 122)))
                    (then (i32.sub (local.get $c) (i32.const 71)))
                    (else
                        (if (result i32)
                            (i32.and (i32.ge_u (local.get $c) (i32.const 48)) (i32.le_u (local.get $c) (i32.const 57)))
                            (then (i32.add (local.get $c) (i32.const 4)))
                            (else
                                (if (result i32) (i32.eq (local.get $c) (i32.const 43))
                                    (then (i32.const 62))
                                    (else
                                        (select (i32.const 63) (i32.const 0)
                                            (i32.eq (local.get $c) (i32.const 47))))))))))))

    (func $decode (param $src i32) (param $len i32) (param $dst i32) (result i32)
        (local $i i32)
        (local $o i32)
        (local $v i32)
        (local $p i32)
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (i32.add (local.get $i) (i32.const 3)) (local.get $len)))
                (local.set $p (i32.add (local.get $src) (local.get $i)))
                (local.set $v
                    (i32.or
                        (i32.or
                            (i32.shl (call $dec (i32.load8_u (local.get $p))) (i32.const 18))
                            (i32.shl (call $dec (i32.load8_u offset=1 (local.get $p))) (i32.const 12)))
                        (i32.or
                            (i32.shl (call $dec (i32.load8_u offset=2 (local.get $p))) (i32.const 6))
                            (call $dec (i32.load8_u offset=3 (local.get $p))))))
                (local.set $p (i32.add (local.get $dst) (local.get $o)))
                (i32.store8 (local.get $p) (i32.shr_u (local.get $v) (i32.const 16)))
                (i32.store8 offset=1 (local.get $p) (i32.shr_u (local.get $v) (i32.const 8)))
                (i32.store8 offset=2 (local.get $p) (local.get $v))
                (local.set $o (i32.add (local.get $o) (i32.const 3)))
                (local.set $i (i32.add (local.get $i) (i32.const 4)))
                (br $next)))
        (if (i32.ge_u (local.get $len) (i32.const 4))
            (then
                (local.set $p (i32.add (local.get $src) (local.get $len)))
                (if (i32.eq (i32.load8_u (i32.sub (local.get $p) (i32.const 1))) (i32.const 61))
                    (then (local.set $o (i32.sub (local.get $o) (i32.const 1)))))
                (if (i32.eq (i32.load8_u (i32.sub (local.get $p) (i32.const 2))) (i32.const 61))
                    (then (local.set $o (i32.sub (local.get $o) (i32.const 1)))))))
        (local.get $o))

    (func $emit4 (param $dst i32) (param $v i32) (param $rem i32)
        (i32.store8 (local.get $dst)
            (i32.load8_u offset=64
                (i32.and (i32.shr_u (local.get $v) (i32.const 18)) (i32.const 63))))
        (i32.store8 offset=1 (local.get $dst)
            (i32.load8_u offset=64
                (i32.and (i32.shr_u (local.get $v) (i32.const 12)) (i32.const 63))))
        (i32.store8 offset=2 (local.get $dst)
            (select
                (i32.load8_u offset=64
                    (i32.and (i32.shr_u (local.get $v) (i32.const 6)) (i32.const 63)))
                (i32.const 61)
                (i32.gt_u (local.get $rem) (i32.const 1))))
        (i32.store8 offset=3 (local.get $dst)
            (select
                (i32.load8_u offset=64 (i32.and (local.get $v) (i32.const 63)))
                (i32.const 61)
                (i32.gt_u (local.get $rem) (i32.const 2)))))

    (func $encode (param $src i32) (param $len i32) (param $dst i32) (result i32)
        (local $i i32)
        (local $o i32)
        (local $rem i32)
        (local $v i32)
        (local $p i32)
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                (local.set $rem (i32.sub (local.get $len) (local.get $i)))
                (local.set $p (i32.add (local.get $src) (local.get $i)))
                (local.set $v (i32.shl (i32.load8_u (local.get $p)) (i32.const 16)))
                (if (i32.gt_u (local.get $rem) (i32.const 1))
                    (then
                        (local.set $v
                            (i32.or (local.get $v)
                                (i32.shl (i32.load8_u offset=1 (local.get $p)) (i32.const 8))))))
                (if (i32.gt_u (local.get $rem) (i32.const 2))
                    (then
                        (local.set $v
                            (i32.or (local.get $v) (i32.load8_u offset=2 (local.get $p))))))
                (call $emit4 (i32.add (local.get $dst) (local.get $o)) (local.get $v) (local.get $rem))
                (local.set $o (i32.add (local.get $o) (i32.const 4)))
                (local.set $i (i32.add (local.get $i) (i32.const 3)))
                (br $next)))
        (local.get $o))

    (func $decode_field (param $k i32) (param $dst i32) (result i32)
        (local $start i32)
        (local.set $start
            (i32.add
                (call $quote (i32.add (i32.shl (local.get $k) (i32.const 2)) (i32.const 2)))
                (i32.const 1)))
        (call $decode
            (i32.add (i32.const 4096) (local.get $start))
            (i32.sub
                (call $quote (i32.add (i32.shl (local.get $k) (i32.const 2)) (i32.const 3)))
                (local.get $start))
            (local.get $dst)))

    ;; Offset of the state entry for the 3-byte key at $key, or -1.
    (func $find (param $key i32) (result i32)
        (local $p i32)
        (local $end i32)
        (local.set $p (i32.const 20480))
        (local.set $end (i32.add (i32.const 20480) (global.get $state_len)))
        (block $none
            (loop $next
                (br_if $none (i32.gt_u (i32.add (local.get $p) (i32.const 12)) (local.get $end)))
                (if (i32.and
                        (i32.and
                            (i32.eq (i32.load8_u (local.get $p)) (i32.load8_u (local.get $key)))
                            (i32.eq (i32.load8_u offset=1 (local.get $p)) (i32.load8_u offset=1 (local.get $key))))
                        (i32.eq (i32.load8_u offset=2 (local.get $p)) (i32.load8_u offset=2 (local.get $key))))
                    (then (return (local.get $p))))
                (local.set $p (i32.add (local.get $p) (i32.const 12)))
                (br $next)))
        (i32.const -1))

    (func $increment
        (local $p i32)
        (local.set $p (call $find (i32.const 29696)))
        (if (i32.lt_s (local.get $p) (i32.const 0))
            (then
                (local.set $p (i32.add (i32.const 20480) (global.get $state_len)))
                (i32.store8 (local.get $p) (i32.load8_u (i32.const 29696)))
                (i32.store8 offset=1 (local.get $p) (i32.load8_u (i32.const 29697)))
                (i32.store8 offset=2 (local.get $p) (i32.load8_u (i32.const 29698)))
                (i32.store8 offset=3 (local.get $p) (i32.const 0))
                (i64.store offset=4 (local.get $p) (i64.const 0))
                (global.set $state_len (i32.add (global.get $state_len) (i32.const 12)))))
        (i64.store offset=4 (local.get $p)
            (i64.add
                (i64.load offset=4 (local.get $p))
                (i64.load (i32.const 28676)))))

    (func $get
        (local $p i32)
        (i32.store8 (i32.const 29760) (i32.load8_u (i32.const 28673)))
        (i32.store8 (i32.const 29761) (i32.load8_u (i32.const 28674)))
        (i32.store8 (i32.const 29762) (i32.load8_u (i32.const 28675)))
        (i32.store8 (i32.const 29763) (i32.const 0))
        (local.set $p (call $find (i32.const 28673)))
        (i64.store (i32.const 29764)
            (if (result i64) (i32.lt_s (local.get $p) (i32.const 0))
                (then (i64.const 0))
                (else (i64.load offset=4 (local.get $p)))))
        (global.set $result_len (i32.const 12)))

    (func $spin (param $n i32)
        (local $i i32)
        (block $done
            (loop $next
                (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $next))))

    (func $respond
        (local $o i32)
        (memory.copy (i32.const 32768) (i32.const 256) (i32.const 11))
        (local.set $o (i32.const 11))
        (local.set $o
            (i32.add (local.get $o)
                (call $encode
                    (i32.const 29760)
                    (global.get $result_len)
                    (i32.add (i32.const 32768) (local.get $o)))))
        (memory.copy (i32.add (i32.const 32768) (local.get $o)) (i32.const 288) (i32.const 29))
        (local.set $o (i32.add (local.get $o) (i32.const 29)))
        (local.set $o
            (i32.add (local.get $o)
                (call $encode
                    (i32.const 20480)
                    (global.get $state_len)
                    (i32.add (i32.const 32768) (local.get $o)))))
        (memory.copy (i32.add (i32.const 32768) (local.get $o)) (i32.const 320) (i32.const 13))
        (local.set $o (i32.add (local.get $o) (i32.const 13)))
        (call $write (i32.const 1) (i32.const 32768) (local.get $o)))

    (func (export "_start")
        (local $op i32)
        (drop (call $realloc (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
        (call $write (i32.const 2) (i32.const 464) (i32.const 14))

        (if (i32.ne (call $scan_quotes (call $read_input)) (i32.const 12))
            (then
                (call $write (i32.const 1) (i32.const 448) (i32.const 8))
                (return)))

        (global.set $state_len (call $decode_field (i32.const 0) (i32.const 20480)))
        (global.set $payload_len (call $decode_field (i32.const 1) (i32.const 28672)))
        (global.set $actor_len (call $decode_field (i32.const 2) (i32.const 29696)))

        (if (i32.lt_u (global.get $payload_len) (i32.const 12))
            (then
                (call $write (i32.const 1) (i32.const 352) (i32.const 45))
                (return)))

        (local.set $op (i32.load8_u (i32.const 28672)))
        (block $dispatch
            (if (i32.eq (local.get $op) (i32.const 0))
                (then (call $increment) (br $dispatch)))
            (if (i32.eq (local.get $op) (i32.const 1))
                (then (br $dispatch)))
            (if (i32.eq (local.get $op) (i32.const 2))
                (then (call $get) (br $dispatch)))
            (if (i32.eq (local.get $op) (i32.const 3))
                (then (call $spin (i32.load (i32.const 28676))) (br $dispatch)))
            (if (i32.eq (local.get $op) (i32.const 4))
                (then (drop (memory.grow (i32.load (i32.const 28676)))) (br $dispatch)))
            (if (i32.eq (local.get $op) (i32.const 5))
                (then
                    (call $write (i32.const 1) (i32.const 400) (i32.const 45))
                    (return)))
            (if (i32.eq (local.get $op) (i32.const 6))
                (then
                    (call $write (i32.const 1) (i32.const 448) (i32.const 8))
                    (return)))
            (call $write (i32.const 1) (i32.const 352) (i32.const 45))
            (return))

        (call $respond))
)
"#;

/// Guest that writes a minimal envelope and exits through `proc_exit`.
pub fn exiting_guest(status: i32) -> Vec<u8> {
    wat::parse_str(format!(
        r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
            (memory (export "memory") 1)
            (data (i32.const 64) "{{\"success\":true}}")
            (func (export "_start")
                (i32.store (i32.const 0) (i32.const 64))
                (i32.store (i32.const 4) (i32.const 16))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
                (call $proc_exit (i32.const {status}))
                (unreachable))
        )
        "#
    ))
    .unwrap()
}

/// Guest whose memory is capped at two pages. It asks for ten more pages
/// `attempts` times, traps unless every request is refused, then succeeds.
pub fn capped_memory_guest(attempts: u32) -> Vec<u8> {
    wat::parse_str(format!(
        r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1 2)
            (data (i32.const 64) "{{\"success\":true}}")
            (func (export "_start")
                (local $i i32)
                (block $done
                    (loop $grow
                        (br_if $done (i32.ge_u (local.get $i) (i32.const {attempts})))
                        (if (i32.ne (memory.grow (i32.const 10)) (i32.const -1))
                            (then (unreachable)))
                        (local.set $i (i32.add (local.get $i) (i32.const 1)))
                        (br $grow)))
                (i32.store (i32.const 0) (i32.const 64))
                (i32.store (i32.const 4) (i32.const 16))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8))))
        )
        "#
    ))
    .unwrap()
}

pub fn provider_wasm() -> Vec<u8> {
    wat::parse_str(PROVIDER_WAT).unwrap()
}

pub fn counter_guest() -> Arc<[u8]> {
    Arc::from(wat::parse_str(COUNTER_GUEST_WAT).unwrap())
}

/// Provider cache writing its artifact into `dir`.
pub fn provider_cache(dir: &Path) -> ProviderCache {
    ProviderCache::with_path(&EngineConfig::default(), dir.join("javy_provider.cwasm"))
        .with_source(provider_wasm())
}

pub fn executor(dir: &Path) -> Arc<Executor> {
    Arc::new(Executor::new(
        Arc::new(provider_cache(dir)),
        ExecutionConfig::default(),
    ))
}

pub fn payload(op: u8, key: [u8; 3], arg: u64) -> Vec<u8> {
    let mut payload = vec![op];
    payload.extend_from_slice(&key);
    payload.extend_from_slice(&arg.to_le_bytes());
    payload
}

/// Request with generous limits; tests tighten the one they exercise.
pub fn request(bytecode: &Arc<[u8]>, state: &[u8], payload: Vec<u8>, actor: [u8; 3]) -> ExecutionRequest {
    ExecutionRequest::new(Arc::clone(bytecode))
        .with_max_fuel(10_000_000)
        .with_max_time(Duration::from_secs(1))
        .with_max_memory(100 * 1024 * 1024)
        .with_current_state(state.to_vec())
        .with_payload(payload)
        .with_actor(actor.to_vec())
}

/// Decode the counter returned by a get operation.
pub fn counter_value(result: &[u8]) -> u64 {
    assert_eq!(result.len(), 12, "unexpected result: {result:?}");
    u64::from_le_bytes(result[4..12].try_into().unwrap())
}
