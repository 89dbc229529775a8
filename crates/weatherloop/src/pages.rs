//! HTML pages served by the web front end.

use crate::cities::City;
use crate::weather::WeatherRecord;

/// Escape text for HTML element and attribute content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <link rel="stylesheet" href="/static/style.css">
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

/// Home page: city form, plus the weather or the error for the last query.
pub fn index(city: &str, weather: Option<&WeatherRecord>, error: Option<&str>) -> String {
    let mut body = format!(
        r#"  <h1>Weather</h1>
  <form method="get" action="/">
    <input type="text" name="city" placeholder="City name" value="{city}" required>
    <button type="submit">Get weather</button>
  </form>
  <p><a href="/city-list">Browse cities</a></p>
"#,
        city = escape(city)
    );

    if let Some(w) = weather {
        body.push_str(&format!(
            r#"  <section class="weather">
    <h2>{city}</h2>
    <img src="{icon}" alt="{description}">
    <p>Temperature: {temperature:.1} &deg;C</p>
    <p>Conditions: {description}</p>
    <p>Humidity: {humidity}%</p>
  </section>
"#,
            city = escape(&w.city),
            icon = escape(&w.icon_url()),
            description = escape(&w.description),
            temperature = w.temperature,
            humidity = w.humidity,
        ));
    }

    if let Some(e) = error {
        body.push_str(&format!("  <p class=\"error\">{}</p>\n", escape(e)));
    }

    layout("Weather", &body)
}

/// Listing of all loaded cities.
pub fn city_list(cities: &[City]) -> String {
    let mut rows = String::with_capacity(cities.len() * 48);
    for city in cities {
        rows.push_str("      <tr><td>");
        rows.push_str(&escape(&city.name));
        rows.push_str("</td><td>");
        rows.push_str(&escape(&city.country));
        rows.push_str("</td></tr>\n");
    }

    let body = format!(
        r#"  <h1>Cities ({count})</h1>
  <p><a href="/">Back</a></p>
  <table>
    <thead><tr><th>City</th><th>Country</th></tr></thead>
    <tbody>
{rows}    </tbody>
  </table>
"#,
        count = cities.len(),
        rows = rows
    );

    layout("City list", &body)
}

/// Minimal error page for failures outside the form flow.
pub fn error(title: &str, message: &str) -> String {
    layout(
        title,
        &format!(
            "  <h1>{}</h1>\n  <p class=\"error\">{}</p>\n  <p><a href=\"/\">Back</a></p>\n",
            escape(title),
            escape(message)
        ),
    )
}
