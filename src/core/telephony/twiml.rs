//! TwiML answer for inbound calls.

const GREETING: &str = "Connecting you to the network assistant.";

/// `wss://{host}/voice/stream`
pub fn stream_url(host: &str) -> String {
    format!("wss://{}/voice/stream", host.trim_end_matches('/'))
}

/// Answer a call by greeting the caller and connecting its media stream to
/// `stream_url`.
pub fn stream_connect_twiml(stream_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response>\
         <Say>{}</Say>\
         <Connect><Stream url=\"{}\" /></Connect>\
         </Response>",
        escape_xml(GREETING),
        escape_xml(stream_url)
    )
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
