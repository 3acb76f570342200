//! Minimal XML-RPC codec for the supervisord dialect.
//!
//! Handles the document layout Python's `xmlrpclib` emits: typed and untyped
//! `<value>` elements, `i4`/`int`, `boolean`, `double`, `string`, `nil`,
//! `array`, `struct`, and `<fault>` responses. Entity references and numeric
//! character references are unescaped; everything else is rejected as a
//! protocol error rather than guessed at.

use crate::error::{Error, Result};
use crate::value::Value;

/// Encodes a `<methodCall>` document.
pub(crate) fn encode_call(method: &str, params: &[Value]) -> String {
    let mut xml = String::with_capacity(256);
    xml.push_str("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        encode_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>");
    xml
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Nil => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        // XML-RPC only defines 32-bit ints, but supervisord's Python side
        // accepts wider values in <int> (log offsets need them).
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Parses a `<methodResponse>` document into its single result value.
///
/// Fault responses become [`Error::Fault`].
pub(crate) fn parse_response(xml: &str) -> Result<Value> {
    let mut cur = Cursor::new(xml);
    cur.skip_ws();
    if cur.eat("<?xml") {
        cur.text_until("?>")?;
    }
    cur.expect("<methodResponse>")?;
    if cur.eat("<fault>") {
        let fault = parse_value(&mut cur)?;
        let code = fault.i64_member("faultCode")? as i32;
        let message = fault.str_member("faultString")?;
        return Err(Error::Fault { code, message });
    }
    cur.expect("<params>")?;
    if cur.eat("</params>") {
        return Ok(Value::Nil);
    }
    cur.expect("<param>")?;
    let value = parse_value(&mut cur)?;
    cur.expect("</param>")?;
    Ok(value)
}

fn parse_value(cur: &mut Cursor<'_>) -> Result<Value> {
    cur.expect("<value>")?;
    let start = cur.pos;

    let value = if cur.eat("<string>") {
        let text = cur.text_until("</string>")?;
        Value::String(unescape(text)?)
    } else if cur.eat("<int>") {
        parse_int(cur.text_until("</int>")?)?
    } else if cur.eat("<i4>") {
        parse_int(cur.text_until("</i4>")?)?
    } else if cur.eat("<boolean>") {
        match cur.text_until("</boolean>")?.trim() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => return Err(Error::Protocol(format!("invalid boolean '{other}'"))),
        }
    } else if cur.eat("<double>") {
        let text = cur.text_until("</double>")?;
        let parsed = text
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Protocol(format!("invalid double '{}'", text.trim())))?;
        Value::Double(parsed)
    } else if cur.eat("<nil/>") {
        Value::Nil
    } else if cur.eat("<array>") {
        cur.expect("<data>")?;
        let mut items = Vec::new();
        loop {
            if cur.eat("</data>") {
                break;
            }
            items.push(parse_value(cur)?);
        }
        cur.expect("</array>")?;
        Value::Array(items)
    } else if cur.eat("<struct>") {
        let mut members = Vec::new();
        loop {
            if cur.eat("</struct>") {
                break;
            }
            cur.expect("<member>")?;
            cur.expect("<name>")?;
            let name = unescape(cur.text_until("</name>")?)?;
            let member = parse_value(cur)?;
            cur.expect("</member>")?;
            members.push((name, member));
        }
        Value::Struct(members)
    } else {
        // A <value> without a type element is a string.
        cur.pos = start;
        let text = cur.text_until("</value>")?;
        return Ok(Value::String(unescape(text)?));
    };

    cur.expect("</value>")?;
    Ok(value)
}

fn parse_int(text: &str) -> Result<Value> {
    text.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| Error::Protocol(format!("invalid int '{}'", text.trim())))
}

/// Byte cursor over the response body. Tag matching skips the indentation
/// whitespace xmlrpclib puts between elements.
struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, pos: 0 }
    }

    fn skip_ws(&mut self) {
        let rest = &self.s[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.s[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "expected '{token}' at byte {} of response",
                self.pos
            )))
        }
    }

    fn text_until(&mut self, close: &str) -> Result<&'a str> {
        match self.s[self.pos..].find(close) {
            Some(offset) => {
                let text = &self.s[self.pos..self.pos + offset];
                self.pos += offset + close.len();
                Ok(text)
            }
            None => Err(Error::Protocol(format!("missing closing '{close}'"))),
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

fn unescape(s: &str) -> Result<String> {
    if !s.contains('&') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest
            .find(';')
            .ok_or_else(|| Error::Protocol("unterminated entity reference".to_string()))?;
        let entity = &rest[1..semi];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(std::result::Result::ok)
                    .and_then(char::from_u32);
                match code {
                    Some(c) => out.push(c),
                    None => {
                        return Err(Error::Protocol(format!("unknown entity '&{entity};'")));
                    }
                }
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call_no_params() {
        let xml = encode_call("supervisor.getAPIVersion", &[]);
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?>\n<methodCall><methodName>supervisor.getAPIVersion\
             </methodName><params></params></methodCall>"
        );
    }

    #[test]
    fn test_encode_call_tail_params() {
        let xml = encode_call(
            "supervisor.tailProcessStdoutLog",
            &[Value::from("worker"), Value::Int(1024), Value::Int(8192)],
        );

        assert!(xml.contains("<methodName>supervisor.tailProcessStdoutLog</methodName>"));
        assert!(xml.contains("<param><value><string>worker</string></value></param>"));
        assert!(xml.contains("<param><value><int>1024</int></value></param>"));
        assert!(xml.contains("<param><value><int>8192</int></value></param>"));
    }

    #[test]
    fn test_encode_escapes_content() {
        let xml = encode_call("m", &[Value::from("a<b & c>d \"q\"")]);
        assert!(xml.contains("<string>a&lt;b &amp; c&gt;d &quot;q&quot;</string>"));
    }

    #[test]
    fn test_encode_struct_and_array() {
        let value = Value::Struct(vec![
            ("name".to_string(), Value::from("worker")),
            ("tags".to_string(), Value::Array(vec![Value::Bool(true), Value::Nil])),
        ]);
        let mut out = String::new();
        encode_value(&mut out, &value);

        assert_eq!(
            out,
            "<value><struct><member><name>name</name><value><string>worker</string></value>\
             </member><member><name>tags</name><value><array><data><value><boolean>1</boolean>\
             </value><value><nil/></value></data></array></value></member></struct></value>"
        );
    }

    #[test]
    fn test_parse_string_response_python_layout() {
        // Exact layout produced by xmlrpclib for getAPIVersion
        let xml = "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n\
                   <value><string>3.0</string></value>\n</param>\n</params>\n</methodResponse>\n";

        let value = parse_response(xml).unwrap();
        assert_eq!(value, Value::String("3.0".to_string()));
    }

    #[test]
    fn test_parse_untyped_value_is_string() {
        let xml = "<methodResponse><params><param><value>plain</value></param></params>\
                   </methodResponse>";

        let value = parse_response(xml).unwrap();
        assert_eq!(value, Value::String("plain".to_string()));
    }

    #[test]
    fn test_parse_tail_reply_tuple() {
        let xml = "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n\
                   <value><array><data>\n\
                   <value><string>line one\nline two\n</string></value>\n\
                   <value><int>2048</int></value>\n\
                   <value><boolean>0</boolean></value>\n\
                   </data></array></value>\n</param>\n</params>\n</methodResponse>\n";

        let value = parse_response(xml).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items[0].as_str(), Some("line one\nline two\n"));
        assert_eq!(items[1].as_i64(), Some(2048));
        assert_eq!(items[2].as_bool(), Some(false));
    }

    #[test]
    fn test_parse_struct_response() {
        let xml = "<methodResponse><params><param><value><struct>\n\
                   <member>\n<name>statecode</name>\n<value><int>1</int></value>\n</member>\n\
                   <member>\n<name>statename</name>\n<value><string>RUNNING</string></value>\n</member>\n\
                   </struct></value></param></params></methodResponse>";

        let value = parse_response(xml).unwrap();
        assert_eq!(value.i64_member("statecode").unwrap(), 1);
        assert_eq!(value.str_member("statename").unwrap(), "RUNNING");
    }

    #[test]
    fn test_parse_nested_arrays() {
        // reloadConfig returns [[added, changed, removed]]
        let xml = "<methodResponse><params><param><value><array><data>\
                   <value><array><data>\
                   <value><array><data><value><string>cache</string></value></data></array></value>\
                   <value><array><data></data></array></value>\
                   <value><array><data><value><string>web</string></value></data></array></value>\
                   </data></array></value>\
                   </data></array></value></param></params></methodResponse>";

        let value = parse_response(xml).unwrap();
        let outer = value.as_array().unwrap();
        let inner = outer[0].as_array().unwrap();
        assert_eq!(inner[0].as_array().unwrap()[0].as_str(), Some("cache"));
        assert!(inner[1].as_array().unwrap().is_empty());
        assert_eq!(inner[2].as_array().unwrap()[0].as_str(), Some("web"));
    }

    #[test]
    fn test_parse_fault_response() {
        let xml = "<?xml version='1.0'?>\n<methodResponse>\n<fault>\n<value><struct>\n\
                   <member>\n<name>faultCode</name>\n<value><int>10</int></value>\n</member>\n\
                   <member>\n<name>faultString</name>\n\
                   <value><string>BAD_NAME: worker</string></value>\n</member>\n\
                   </struct></value>\n</fault>\n</methodResponse>\n";

        let err = parse_response(xml).unwrap_err();
        match err {
            Error::Fault { code, message } => {
                assert_eq!(code, 10);
                assert_eq!(message, "BAD_NAME: worker");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_i4_and_nil() {
        let xml = "<methodResponse><params><param><value><array><data>\
                   <value><i4>-7</i4></value><value><nil/></value>\
                   </data></array></value></param></params></methodResponse>";

        let value = parse_response(xml).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items[0], Value::Int(-7));
        assert_eq!(items[1], Value::Nil);
    }

    #[test]
    fn test_parse_double() {
        let xml = "<methodResponse><params><param>\
                   <value><double>2.5</double></value>\
                   </param></params></methodResponse>";

        assert_eq!(parse_response(xml).unwrap(), Value::Double(2.5));
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape("a &lt;tag&gt; &amp; &quot;x&quot; &apos;y&apos;").unwrap(),
                   "a <tag> & \"x\" 'y'");
        assert_eq!(unescape("no entities").unwrap(), "no entities");
        assert_eq!(unescape("&#65;&#x42;").unwrap(), "AB");
    }

    #[test]
    fn test_unescape_rejects_garbage() {
        assert!(unescape("dangling &amp").is_err());
        assert!(unescape("&bogus;").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_document() {
        assert!(parse_response("<html>not xmlrpc</html>").is_err());
        assert!(parse_response("<methodResponse><params><param><value><int>12")
            .is_err());
        assert!(matches!(
            parse_response("<methodResponse><params><param><value><int>abc</int></value>\
                            </param></params></methodResponse>"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_large_offset() {
        let xml = "<methodResponse><params><param><value><int>8589934592</int></value>\
                   </param></params></methodResponse>";

        assert_eq!(parse_response(xml).unwrap(), Value::Int(8589934592));
    }

    #[test]
    fn test_escaped_log_content_round_trips() {
        let chunk = "WARN <slow query> took 3s & retried\n";
        let xml = format!(
            "<methodResponse><params><param><value><string>{}</string></value>\
             </param></params></methodResponse>",
            escape(chunk)
        );

        assert_eq!(parse_response(&xml).unwrap().as_str(), Some(chunk));
    }
}
