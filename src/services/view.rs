//! HTML rendering for the single upload page.
//!
//! The page has three states driven by [`ViewModel`]: neutral (form only),
//! success (form plus preview and download link) and error (form plus banner).

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

const ERROR_BANNER: &str = r#"        <div class="bg-red-50 border-l-4 border-red-500 text-red-800 p-4 rounded-lg" role="alert">
            <p class="font-bold">Processing Error</p>
            <p>{{ error_message }}</p>
        </div>
"#;

const RESULT_PREVIEW: &str = r#"                <div class="w-full h-64 flex items-center justify-center p-2 rounded-lg checkerboard shadow-md">
                    <img src="{{ output_image_url }}" alt="Image with background removed"
                         class="max-w-full max-h-full object-contain border-2 border-green-500 rounded-lg">
                </div>
                <a href="{{ output_image_url }}" download="bg_eraser_result.png"
                   class="px-8 py-3 bg-green-500 text-white text-lg font-bold rounded-full shadow hover:bg-green-600">
                    Download PNG
                </a>"#;

const RESULT_PLACEHOLDER: &str = r#"                <div class="text-center text-gray-500 p-8">
                    <p class="text-lg font-medium">Your processed image will appear here.</p>
                    <p class="text-sm mt-1">PNG, JPG, GIF and WebP are supported.</p>
                </div>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Neutral,
    Success,
    Error,
}

/// Data the page is rendered from. At most one field is ever set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    error_message: Option<String>,
    output_image_url: Option<String>,
}

impl ViewModel {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn success(output_image_url: impl Into<String>) -> Self {
        Self {
            error_message: None,
            output_image_url: Some(output_image_url.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            output_image_url: None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn output_image_url(&self) -> Option<&str> {
        self.output_image_url.as_deref()
    }

    pub fn state(&self) -> ViewState {
        match (&self.error_message, &self.output_image_url) {
            (Some(_), _) => ViewState::Error,
            (None, Some(_)) => ViewState::Success,
            (None, None) => ViewState::Neutral,
        }
    }
}

pub fn render(view: &ViewModel) -> String {
    let error_banner = match view.error_message() {
        Some(message) => ERROR_BANNER.replace("{{ error_message }}", &escape_html(message)),
        None => String::new(),
    };

    let result_panel = match (view.state(), view.output_image_url()) {
        (ViewState::Success, Some(url)) => {
            RESULT_PREVIEW.replace("{{ output_image_url }}", &escape_html(url))
        }
        _ => RESULT_PLACEHOLDER.to_string(),
    };

    INDEX_TEMPLATE
        .replace("{{ error_banner }}", &error_banner)
        .replace("{{ result_panel }}", &result_panel)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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
