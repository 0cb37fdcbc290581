//! Drive page served at `/`.
//!
//! Two sliders stream `{"ct":"v"}` commands over `/ws` at 10 Hz; releasing
//! the page or pressing Stop sends a zero velocity.

pub(crate) const HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>diff-drive</title>
<style>
body { font-family: sans-serif; margin: 2em; max-width: 28em; }
label { display: block; margin-top: 1em; }
input[type=range] { width: 100%; }
button { margin-top: 1em; margin-right: 0.5em; padding: 0.5em 1em; }
#status { color: #666; margin-top: 1em; }
</style>
</head>
<body>
<h1>diff-drive</h1>
<label>linear <span id="lv">0.00</span><input id="linear" type="range" min="-1" max="1" step="0.05" value="0"></label>
<label>angular <span id="av">0.00</span><input id="angular" type="range" min="-1" max="1" step="0.05" value="0"></label>
<button id="stop">Stop</button>
<button id="enable">Enable</button>
<button id="disable">Disable</button>
<div id="status">connecting</div>
<script>
const session = Math.random().toString(36).slice(2);
const ws = new WebSocket(`ws://${location.host}/ws?session=${session}`, "messages");
const linear = document.getElementById("linear");
const angular = document.getElementById("angular");
const send = (cmd) => { if (ws.readyState === 1) ws.send(JSON.stringify(cmd)); };
const zero = () => { linear.value = 0; angular.value = 0; send({ ct: "d", dc: "stop" }); };
ws.onopen = () => { document.getElementById("status").textContent = "connected"; };
ws.onclose = () => { document.getElementById("status").textContent = "disconnected"; };
ws.onmessage = (e) => { document.getElementById("status").textContent = e.data; };
setInterval(() => {
  document.getElementById("lv").textContent = Number(linear.value).toFixed(2);
  document.getElementById("av").textContent = Number(angular.value).toFixed(2);
  send({ ct: "v", linear: Number(linear.value), angular: Number(angular.value) });
}, 100);
document.getElementById("stop").onclick = zero;
document.getElementById("enable").onclick = () => send({ ct: "d", dc: "enable" });
document.getElementById("disable").onclick = () => send({ ct: "d", dc: "disable" });
window.addEventListener("blur", zero);
</script>
</body>
</html>
"#;
