//! End-to-end tests against a live server on an ephemeral port.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nano_http::handler::{make_handler, BoxError};
use nano_http::protocol::SendError;
use nano_http::server::{HttpServer, ServerConfig};

fn serve(config: ServerConfig) -> (HttpServer, SocketAddr) {
    let server = HttpServer::new();
    server.start(config.with_port(0)).expect("server must start on an ephemeral port");
    let addr = server.local_addr().expect("started server has an address");
    (server, addr)
}

/// One request/response exchange over a fresh connection.
fn exchange(addr: SocketAddr, wire: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).expect("read timeout");

    stream.write_all(wire).expect("send request");
    let _ = stream.shutdown(Shutdown::Write);

    let mut reply = String::new();
    stream.read_to_string(&mut reply).expect("read reply");
    reply
}

/// Connects without sending anything and reads whatever the server offers.
/// Refusals are written before any request byte is consumed, so a silent
/// client observes them cleanly.
fn probe(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).expect("read timeout");

    let mut reply = String::new();
    stream.read_to_string(&mut reply).expect("read reply");
    reply
}

#[test]
fn server_without_handler_answers_501() {
    let (server, addr) = serve(ServerConfig::new());

    assert_eq!(probe(addr), "HTTP/1.1 501 Not Implemented\r\n\r\n");

    server.close().unwrap();
}

#[test]
fn get_requests_reach_the_handler_decoded() {
    let handler = make_handler(|request, response, _raw| -> Result<(), SendError> {
        response.add_header("Content-Type", "text/plain")?;
        response.write(request.path().as_bytes())?;
        if let Some(x) = request.param("x") {
            response.write(b" x=")?;
            response.write(x.as_bytes())?;
        }
        response.finish()
    });
    let (server, addr) = serve(ServerConfig::new().with_execute(handler));

    let reply = exchange(addr, b"GET /a/b%20c?x=1 HTTP/1.1\r\nHost: t\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.contains("Content-Type: text/plain\r\n"));
    assert!(reply.ends_with("\r\n\r\n/a/b c x=1"));

    server.close().unwrap();
}

#[test]
fn form_posts_decode_into_ordered_parameter_lists() {
    let handler = make_handler(|request, response, _raw| -> Result<(), BoxError> {
        let decoded = request.decode_body()?;
        assert!(decoded);

        let xs: Vec<&str> = request.params_of("x").collect();
        response.write(xs.join(",").as_bytes())?;
        response.finish()?;
        Ok(())
    });
    let (server, addr) = serve(ServerConfig::new().with_execute(handler));

    let reply = exchange(
        addr,
        b"POST /sum HTTP/1.1\r\n\
          Content-Type: application/x-www-form-urlencoded\r\n\
          Content-Length: 7\r\n\r\nx=1&x=2",
    );
    assert!(reply.ends_with("\r\n\r\n1,2"));

    server.close().unwrap();
}

#[test]
fn oversized_preamble_answers_431() {
    let handler = make_handler(|_request, response, _raw| -> Result<(), SendError> {
        response.finish()
    });
    let (server, addr) =
        serve(ServerConfig::new().with_preamble_limit(1024).with_execute(handler));

    // a full limit of bytes without any blank line
    let reply = exchange(addr, &vec![b'a'; 1024]);
    assert_eq!(reply, "HTTP/1.1 431 Request Header Fields Too Large\r\n\r\n");

    server.close().unwrap();
}

#[test]
fn malformed_preamble_answers_400() {
    let handler = make_handler(|_request, response, _raw| -> Result<(), SendError> {
        response.finish()
    });
    let (server, addr) = serve(ServerConfig::new().with_execute(handler));

    let reply = exchange(addr, b"GET /nothing-more\r\n\r\n");
    assert_eq!(reply, "HTTP/1.1 400 Bad Request\r\n\r\n");

    server.close().unwrap();
}

#[test]
fn failing_handler_answers_500_when_clean() {
    let handler = make_handler(|_request, _response, _raw| -> Result<(), SendError> {
        Err(SendError::io(std::io::Error::other("expected failure")))
    });
    let (server, addr) = serve(ServerConfig::new().with_execute(handler));

    let reply = exchange(addr, b"GET / HTTP/1.1\r\n\r\n");
    assert_eq!(reply, "HTTP/1.1 500 Internal Server Error\r\n\r\n");

    server.close().unwrap();
}

#[test]
fn capacity_overflow_takes_the_deny_path() {
    let started = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(AtomicBool::new(false));

    let handler = {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        make_handler(move |_request, response, _raw| -> Result<(), SendError> {
            started.fetch_add(1, Ordering::SeqCst);
            while !release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            response.write(b"held")?;
            response.finish()
        })
    };
    let (server, addr) = serve(ServerConfig::new().with_max_workers(2).with_execute(handler));

    // occupy both workers
    let holders: Vec<_> = (0..2)
        .map(|_| thread::spawn(move || exchange(addr, b"GET /hold HTTP/1.1\r\n\r\n")))
        .collect();
    let deadline = Instant::now() + Duration::from_secs(5);
    while started.load(Ordering::SeqCst) < 2 {
        assert!(Instant::now() < deadline, "handlers did not start in time");
        thread::sleep(Duration::from_millis(5));
    }

    // the pool is full now, one more connection is refused
    assert_eq!(probe(addr), "HTTP/1.1 503 Service Unavailable\r\n\r\n");

    release.store(true, Ordering::SeqCst);
    for holder in holders {
        let reply = holder.join().unwrap();
        assert!(reply.ends_with("held"));
    }

    server.close().unwrap();
}

#[test]
fn close_unbinds_before_inflight_requests_drain() {
    let started = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(AtomicBool::new(false));

    let handler = {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        make_handler(move |_request, response, _raw| -> Result<(), SendError> {
            started.fetch_add(1, Ordering::SeqCst);
            while !release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            response.write(b"held")?;
            response.finish()
        })
    };
    let (server, addr) = serve(ServerConfig::new().with_execute(handler));

    let holder = thread::spawn(move || exchange(addr, b"GET /hold HTTP/1.1\r\n\r\n"));
    let deadline = Instant::now() + Duration::from_secs(5);
    while started.load(Ordering::SeqCst) < 1 {
        assert!(Instant::now() < deadline, "handler did not start in time");
        thread::sleep(Duration::from_millis(5));
    }

    // the port frees up right away, not when the held request finishes
    server.close().unwrap();
    assert!(TcpStream::connect(addr).is_err(), "listener must be gone after close");

    release.store(true, Ordering::SeqCst);
    assert!(holder.join().unwrap().ends_with("held"));
}

#[test]
fn custom_deny_hook_replaces_the_503() {
    let handler = make_handler(|_request, response, _raw| -> Result<(), SendError> {
        response.finish()
    });
    let config = ServerConfig::new().with_execute(handler).with_deny(|stream, _error| {
        let mut out = stream;
        let _ = out.write_all(b"HTTP/1.1 429 Too Many Requests\r\n\r\n").and_then(|()| out.flush());
    });
    let (server, addr) = serve(config);

    server.hangup().unwrap();
    assert_eq!(probe(addr), "HTTP/1.1 429 Too Many Requests\r\n\r\n");

    server.close().unwrap();
}

#[test]
fn hangup_denies_and_resume_recovers() {
    let handler = make_handler(|_request, response, _raw| -> Result<(), SendError> {
        response.write(b"alive")?;
        response.finish()
    });
    let (server, addr) = serve(ServerConfig::new().with_execute(handler));

    assert!(exchange(addr, b"GET / HTTP/1.1\r\n\r\n").ends_with("alive"));

    server.hangup().unwrap();
    assert_eq!(probe(addr), "HTTP/1.1 503 Service Unavailable\r\n\r\n");

    server.resume().unwrap();
    assert!(exchange(addr, b"GET / HTTP/1.1\r\n\r\n").ends_with("alive"));

    server.close().unwrap();
}

#[test]
fn closed_server_can_start_again() {
    let handler = || {
        make_handler(|_request, response, _raw| -> Result<(), SendError> {
            response.write(b"round")?;
            response.finish()
        })
    };

    let server = HttpServer::new();
    server.start(ServerConfig::new().with_port(0).with_execute(handler())).unwrap();
    let first = server.local_addr().unwrap();
    assert!(exchange(first, b"GET / HTTP/1.1\r\n\r\n").ends_with("round"));

    assert!(matches!(
        server.start(ServerConfig::new().with_port(0)),
        Err(nano_http::protocol::ServerError::AlreadyStarted)
    ));

    server.close().unwrap();
    server.start(ServerConfig::new().with_port(0).with_execute(handler())).unwrap();
    let second = server.local_addr().unwrap();
    assert!(exchange(second, b"GET / HTTP/1.1\r\n\r\n").ends_with("round"));

    server.close().unwrap();
}
