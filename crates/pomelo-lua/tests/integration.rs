//! Integration tests driving the `pomelo` module from Lua scripts over the
//! loopback transport

use mlua::{Lua, Table};
use pomelo_lua::{register_pomelo_module, Pomelo};
use pomelo_native::{DummyHub, ResultCode, SentKind, Timeout};
use std::rc::Rc;

struct Harness {
    lua: Lua,
    hub: DummyHub,
    pomelo: Rc<Pomelo>,
}

/// Lua state with the module loaded and a connected client in the global
/// `client`.
fn connected() -> Harness {
    let lua = Lua::new();
    let hub = DummyHub::new();
    let pomelo = Rc::new(Pomelo::with_dummy(hub.clone()));
    register_pomelo_module(&lua, pomelo.clone()).unwrap();

    lua.load(
        r#"
        pomelo = require("pomelo")
        client = pomelo.newClient({ transport_name = "DUMMY" })
        assert(client:connect("127.0.0.1", 3010))
        pomelo.poll()
        assert(client:state() == "CONNECTED")
        "#,
    )
    .exec()
    .unwrap();

    Harness { lua, hub, pomelo }
}

// ============================================================================
// LISTENERS
// ============================================================================

#[test]
fn test_listeners_fire_in_registration_order() {
    let h = connected();
    h.lua
        .load(
            r#"
            calls = {}
            local c = pomelo.newClient({ transport_name = "DUMMY" })
            c:on("connected", function() table.insert(calls, "f") end)
            c:on("connected", function() table.insert(calls, "g") end)
            c:connect("127.0.0.1", 3010)
            pomelo.poll()
            pomelo.poll()
            "#,
        )
        .exec()
        .unwrap();

    let calls: Vec<String> = h.lua.load("return calls").eval().unwrap();
    assert_eq!(calls, vec!["f", "g"]);
}

#[test]
fn test_push_reaches_route_listeners() {
    let h = connected();
    h.lua
        .load(
            r#"
            got = {}
            client:on("onChat", function(payload) table.insert(got, payload) end)
            client:on("onOther", function() error("wrong route") end)
            "#,
        )
        .exec()
        .unwrap();

    let remote = h.hub.latest().unwrap();
    remote.push("onChat", r#"{"msg":"hi"}"#);
    remote.push("onChat", r#"{"msg":"again"}"#);
    h.pomelo.poll(&h.lua);

    let got: Vec<String> = h.lua.load("return got").eval().unwrap();
    assert_eq!(got, vec![r#"{"msg":"hi"}"#, r#"{"msg":"again"}"#]);
}

#[test]
fn test_error_events_carry_reason() {
    let h = connected();
    h.lua
        .load(
            r#"
            reasons = {}
            client:on("error", function(reason) table.insert(reasons, reason) end)
            "#,
        )
        .exec()
        .unwrap();

    let remote = h.hub.latest().unwrap();
    remote.protocol_error("bad package");
    remote.drop_connection("peer reset");
    h.pomelo.poll(&h.lua);

    let reasons: Vec<String> = h.lua.load("return reasons").eval().unwrap();
    assert_eq!(reasons, vec!["bad package", "peer reset"]);
}

#[test]
fn test_connect_refused_reports_error_event() {
    let lua = Lua::new();
    let hub = DummyHub::new();
    let pomelo = Rc::new(Pomelo::with_dummy(hub.clone()));
    register_pomelo_module(&lua, pomelo.clone()).unwrap();

    lua.load(
        r#"
        pomelo = require("pomelo")
        client = pomelo.newClient({ transport_name = "DUMMY" })
        client:on("error", function(reason) failure = reason end)
        client:on("connected", function() connected = true end)
        "#,
    )
    .exec()
    .unwrap();
    hub.latest().unwrap().refuse_connections(Some("connection refused"));

    lua.load(r#"client:connect("127.0.0.1", 3010); pomelo.poll()"#)
        .exec()
        .unwrap();

    let (failure, connected, state): (String, Option<bool>, String) = lua
        .load("return failure, connected, client:state()")
        .eval()
        .unwrap();
    assert_eq!(failure, "connection refused");
    assert_eq!(connected, None);
    assert_eq!(state, "INITED");
}

#[test]
fn test_once_kicked_is_removed_even_when_it_throws() {
    let h = connected();
    h.lua
        .load(
            r#"
            kicks = 0
            client:once("kicked", function()
                kicks = kicks + 1
                error("handler failed")
            end)
            "#,
        )
        .exec()
        .unwrap();

    let remote = h.hub.latest().unwrap();
    remote.kick();
    h.pomelo.poll(&h.lua);

    let (kicks, left): (i64, i64) = h
        .lua
        .load(r#"return kicks, #client:listeners("kicked")"#)
        .eval()
        .unwrap();
    assert_eq!((kicks, left), (1, 0));

    remote.kick();
    h.pomelo.poll(&h.lua);
    let kicks: i64 = h.lua.load("return kicks").eval().unwrap();
    assert_eq!(kicks, 1);
}

#[test]
fn test_listener_added_during_dispatch_runs_next_pass() {
    let h = connected();
    h.lua
        .load(
            r#"
            late = 0
            client:once("onTick", function()
                client:on("onTick", function() late = late + 1 end)
            end)
            "#,
        )
        .exec()
        .unwrap();

    let remote = h.hub.latest().unwrap();
    remote.push("onTick", "1");
    h.pomelo.poll(&h.lua);
    assert_eq!(h.lua.load("return late").eval::<i64>().unwrap(), 0);

    remote.push("onTick", "2");
    h.pomelo.poll(&h.lua);
    assert_eq!(h.lua.load("return late").eval::<i64>().unwrap(), 1);
}

#[test]
fn test_off_removes_one_of_k_registrations() {
    let h = connected();
    let (count, still_f): (i64, bool) = h
        .lua
        .load(
            r#"
            local f = function() end
            local g = function() end
            client:on("e", f):on("e", g):on("e", f):on("e", f)
            client:off("e", f)
            local ls = client:listeners("e")
            return #ls, ls[1] == f and ls[2] == g and ls[3] == f
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(count, 3);
    assert!(still_f);
}

#[test]
fn test_listeners_returns_a_copy() {
    let h = connected();
    let count: i64 = h
        .lua
        .load(
            r#"
            client:on("e", print)
            local ls = client:listeners("e")
            table.insert(ls, print)
            ls[1] = nil
            return #client:listeners("e")
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_callable_tables_are_listeners() {
    let h = connected();
    h.lua
        .load(
            r#"
            handler = setmetatable({ seen = {} }, {
                __call = function(self, payload) table.insert(self.seen, payload) end,
            })
            client:on("onChat", handler)
            "#,
        )
        .exec()
        .unwrap();

    h.hub.latest().unwrap().push("onChat", "hello");
    h.pomelo.poll(&h.lua);

    let (seen, removed): (String, i64) = h
        .lua
        .load(
            r#"
            local seen = handler.seen[1]
            client:off("onChat", handler)
            return seen, #client:listeners("onChat")
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(seen, "hello");
    assert_eq!(removed, 0);
}

// ============================================================================
// REQUEST / NOTIFY
// ============================================================================

#[test]
fn test_request_not_found_passes_descriptor() {
    let h = connected();
    h.hub
        .latest()
        .unwrap()
        .reply("echo", pomelo_native::Reply::Fail(ResultCode::NotFound));

    h.lua
        .load(
            r#"
            calls = 0
            assert(client:request("echo", "hello", 1000, function(err, req, res)
                calls = calls + 1
                result = { err = err, route = req.route, message = req.message,
                           timeout = req.timeout, res = res }
            end))
            "#,
        )
        .exec()
        .unwrap();
    h.pomelo.poll(&h.lua);
    h.pomelo.poll(&h.lua);

    let calls: i64 = h.lua.load("return calls").eval().unwrap();
    assert_eq!(calls, 1);
    let result: Table = h.lua.load("return result").eval().unwrap();
    assert_eq!(result.get::<String>("err").unwrap(), "NOT_FOUND");
    assert_eq!(result.get::<String>("route").unwrap(), "echo");
    assert_eq!(result.get::<String>("message").unwrap(), "hello");
    assert_eq!(result.get::<i64>("timeout").unwrap(), 1000);
    assert_eq!(result.get::<Option<String>>("res").unwrap(), None);

    let sent = h.hub.latest().unwrap().sent();
    assert_eq!(sent[0].kind, SentKind::Request);
    assert_eq!(sent[0].timeout, Timeout::secs(1000));
}

#[test]
fn test_request_success_without_timeout() {
    let h = connected();
    let (err, route, timeout, res): (Option<String>, String, i64, String) = h
        .lua
        .load(
            r#"
            local out
            client:request("connector.entryHandler.entry", '{"uid":1}', function(err, req, res)
                out = { err, req.route, req.timeout, res }
            end)
            pomelo.poll()
            return out[1], out[2], out[3], out[4]
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(err, None);
    assert_eq!(route, "connector.entryHandler.entry");
    assert_eq!(timeout, -1);
    assert_eq!(res, r#"{"uid":1}"#);
}

#[test]
fn test_request_timeout_is_relayed() {
    let h = connected();
    h.hub
        .latest()
        .unwrap()
        .reply("slow", pomelo_native::Reply::Silent);

    h.lua
        .load(r#"client:request("slow", "x", 0, function(err) timeout_err = err end)"#)
        .exec()
        .unwrap();
    h.pomelo.poll(&h.lua);

    let err: String = h.lua.load("return timeout_err").eval().unwrap();
    assert_eq!(err, "TIMEOUT");
}

#[test]
fn test_disconnect_resets_in_flight_requests() {
    let h = connected();
    h.hub
        .latest()
        .unwrap()
        .reply("slow", pomelo_native::Reply::Silent);

    let (err, disconnected): (String, bool) = h
        .lua
        .load(
            r#"
            local err, disconnected
            client:on("disconnect", function() disconnected = true end)
            client:request("slow", "x", function(e) err = e end)
            assert(client:disconnect())
            pomelo.poll()
            return err, disconnected
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(err, "RESET");
    assert!(disconnected);
}

#[test]
fn test_notify_without_callback_never_raises() {
    let h = connected();
    h.hub
        .latest()
        .unwrap()
        .reply("chat.send", pomelo_native::Reply::Fail(ResultCode::Error));

    h.lua
        .load(
            r#"
            assert(client:notify("chat.send", "hi", 10))
            assert(client:notify("chat.send", "hi"))
            pomelo.poll()
            "#,
        )
        .exec()
        .unwrap();

    let sent = h.hub.latest().unwrap().sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.kind == SentKind::Notify));
}

#[test]
fn test_notify_callback_gets_error_and_descriptor_only() {
    let h = connected();
    let (err, route, argc): (Option<String>, String, i64) = h
        .lua
        .load(
            r##"
            local out
            client:notify("chat.send", "hi", function(...)
                local err, req = ...
                out = { err, req.route, select("#", ...) }
            end)
            pomelo.poll()
            return out[1], out[2], out[3]
            "##,
        )
        .eval()
        .unwrap();
    assert_eq!(err, None);
    assert_eq!(route, "chat.send");
    assert_eq!(argc, 2);
}

#[test]
fn test_operational_failures_return_nil_and_reason() {
    let h = connected();
    let (ok, reason, second): (Option<bool>, String, String) = h
        .lua
        .load(
            r#"
            local ok, reason = client:connect("127.0.0.1", 3010)
            local _, second = client:request("", "m", function() error("never") end)
            return ok, reason, second
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(ok, None);
    assert_eq!(reason, "INVALID_STATE");
    assert_eq!(second, "INVALID_ROUTE");

    h.pomelo.poll(&h.lua);
}

#[test]
fn test_handshake_options_must_be_json() {
    let h = connected();
    let (ok, reason): (Option<bool>, String) = h
        .lua
        .load(
            r#"
            local c = pomelo.newClient({ transport_name = "DUMMY" })
            return c:connect("127.0.0.1", 3010, "{not json")
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(ok, None);
    assert_eq!(reason, "INVALID_JSON");
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_close_twice_then_every_operation_raises() {
    let h = connected();
    let results: Vec<String> = h
        .lua
        .load(
            r#"
            client:close()
            client:close()
            local out = {}
            local ops = {
                function() return client:connect("h", 1) end,
                function() return client:disconnect() end,
                function() return client:request("r", "m", function() end) end,
                function() return client:notify("r", "m") end,
                function() return client:on("e", print) end,
                function() return client:once("e", print) end,
                function() return client:off("e", print) end,
                function() return client:listeners("e") end,
                function() return client:config() end,
                function() return client:state() end,
                function() return client:connQuality() end,
                function() return client:poll() end,
            }
            for _, op in ipairs(ops) do
                local ok, err = pcall(op)
                assert(not ok)
                table.insert(out, tostring(err))
            end
            return out
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|e| e.contains("Client already closed")));
    assert_eq!(h.pomelo.live_clients(), 0);
    assert!(h.hub.latest().unwrap().is_cleaned_up());
}

#[test]
fn test_close_drops_pending_callbacks() {
    let h = connected();
    h.hub
        .latest()
        .unwrap()
        .reply("slow", pomelo_native::Reply::Silent);

    h.lua
        .load(
            r#"
            fired = false
            client:request("slow", "x", function() fired = true end)
            client:close()
            pomelo.poll()
            "#,
        )
        .exec()
        .unwrap();
    let fired: bool = h.lua.load("return fired").eval().unwrap();
    assert!(!fired);
}

#[test]
fn test_listener_closing_another_client_during_poll() {
    let h = connected();
    h.lua
        .load(
            r#"
            other = pomelo.newClient({ transport_name = "DUMMY" })
            other:connect("127.0.0.1", 3011)
            other_events = 0
            other:on("connected", function() other_events = other_events + 1 end)
            client:on("onClose", function() other:close() end)
            "#,
        )
        .exec()
        .unwrap();

    h.hub.remote(0).unwrap().push("onClose", "");
    h.pomelo.poll(&h.lua);

    let events: i64 = h.lua.load("return other_events").eval().unwrap();
    assert_eq!(events, 0);
    assert_eq!(h.pomelo.live_clients(), 1);
}

#[test]
fn test_poll_drives_every_client() {
    let h = connected();
    h.lua
        .load(
            r#"
            up = 0
            for i = 1, 3 do
                local c = pomelo.newClient({ transport_name = "DUMMY" })
                c:on("connected", function() up = up + 1 end)
                c:connect("127.0.0.1", 3010 + i)
                _G["c" .. i] = c
            end
            pomelo.poll()
            "#,
        )
        .exec()
        .unwrap();
    let up: i64 = h.lua.load("return up").eval().unwrap();
    assert_eq!(up, 3);
    assert_eq!(h.pomelo.live_clients(), 4);
}

#[test]
fn test_conn_quality_and_handshake_reach_native() {
    let h = connected();
    h.hub.latest().unwrap().set_conn_quality(87);
    let (a, b): (i64, i64) = h
        .lua
        .load("return client:conn_quality(), client:connQuality()")
        .eval()
        .unwrap();
    assert_eq!((a, b), (87, 87));

    h.lua
        .load(
            r#"
            local c = pomelo.newClient({ transport_name = "DUMMY" })
            assert(c:connect("127.0.0.1", 3010, '{"user":{"name":"x"}}'))
            "#,
        )
        .exec()
        .unwrap();
    assert_eq!(
        h.hub.latest().unwrap().handshake().as_deref(),
        Some(r#"{"user":{"name":"x"}}"#)
    );
}
