use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("Failed to load model file `{path}`")]
    #[diagnostic(
        code(perihelion::model_load),
        help("Check that the file exists and is readable UTF-8 text")
    )]
    ModelLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model: {0}")]
    #[diagnostic(
        code(perihelion::invalid_model),
        help("The model needs `[request_definition]`, `[policy_definition]`, `[policy_effect]` and `[matchers]` sections with `key = value` lines")
    )]
    InvalidModel(String),

    #[error("Matcher compile error: {0}")]
    #[diagnostic(
        code(perihelion::compile),
        help("Matchers may reference `r.<field>`/`p.<field>` from the model definitions, `g`-style role checks, and the built-ins keyMatch, keyMatch2, keyMatch3, regexMatch, ipMatch")
    )]
    Compile(String),

    #[error("Unsupported policy effect `{0}`")]
    #[diagnostic(
        code(perihelion::effect),
        help("Supported effect expressions: `some(where (p.eft == allow))`, `some(where (p.eft == allow)) && !some(where (p.eft == deny))`, `priority(p.eft) || deny`")
    )]
    UnsupportedEffect(String),

    #[error("Evaluation error: {0}")]
    #[diagnostic(
        code(perihelion::eval),
        help("Request and policy value vectors must cover every field index the matcher references")
    )]
    Eval(String),

    #[error("Failed to load policy rules: {0}")]
    #[diagnostic(
        code(perihelion::adapter),
        help("Adapter rows must carry section \"p\" or \"g\", a ptype, and at least one value")
    )]
    Adapter(String),

    #[error("Config error: {0}")]
    #[diagnostic(code(perihelion::config))]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(perihelion::io))]
    Io(#[from] std::io::Error),
}
