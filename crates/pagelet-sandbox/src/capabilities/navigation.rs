//! Navigation capabilities: `redirectTo` and the `props` object.

use crate::builtins::arg;
use crate::builtins::json::{from_json, to_json};
use crate::config::ExecuteOptions;
use crate::host::HostEvent;
use crate::interp::{Abrupt, Interp};
use crate::value::Value;

fn redirect(interp: &mut Interp, _: &Value, args: &[Value]) -> Result<Value, Abrupt> {
    let slug = arg(args, 0).to_js_string().to_string();
    let params = to_json(&arg(args, 1))?.unwrap_or_else(|| serde_json::json!({}));
    interp.record(HostEvent::Redirect { slug, params });
    Ok(Value::Undefined)
}

/// `redirectTo(slug, params?)`
pub(crate) fn redirect_to() -> Value {
    Value::native("redirectTo", redirect)
}

/// `{ navigation: { navigate, goBack }, route: { params } }`
pub(crate) fn props(options: &ExecuteOptions) -> Value {
    let navigation = Value::plain(vec![
        ("navigate", Value::native("navigate", redirect)),
        ("goBack", Value::native("goBack", |_, _, _| Ok(Value::Undefined))),
    ]);
    let route = Value::plain(vec![("params", from_json(&options.route_params))]);
    Value::plain(vec![("navigation", navigation), ("route", route)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;
    use pretty_assertions::assert_eq;

    #[test]
    fn redirect_records_event_with_params() {
        let mut interp = Interp::new(SandboxLimits::default());
        let params = Value::plain(vec![("id", Value::from(7.0))]);
        redirect(&mut interp, &Value::Undefined, &[Value::from("details"), params]).unwrap();
        redirect(&mut interp, &Value::Undefined, &[Value::from("home")]).unwrap();
        assert_eq!(
            interp.take_host_events(),
            vec![
                HostEvent::Redirect { slug: "details".to_string(), params: serde_json::json!({ "id": 7 }) },
                HostEvent::Redirect { slug: "home".to_string(), params: serde_json::json!({}) },
            ]
        );
    }

    #[test]
    fn props_expose_route_params() {
        let mut interp = Interp::new(SandboxLimits::default());
        let options = ExecuteOptions {
            route_params: serde_json::json!({ "tab": "news" }),
            ..ExecuteOptions::default()
        };
        let props = props(&options);
        let route = interp.get(&props, "route").unwrap();
        let params = interp.get(&route, "params").unwrap();
        assert_eq!(interp.get(&params, "tab").unwrap().to_js_string().as_ref(), "news");
    }
}
