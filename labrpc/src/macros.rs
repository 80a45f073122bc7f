/// Define an RPC service: a request enum, per-method reply wrappers, an
/// async `Service` trait for the node side, a typed `Client`, and a
/// `Server` that decodes requests off its inbox and dispatches them one at
/// a time.
#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            use super::*;

            use $crate::network::Envelope;
            use $crate::{server, client};

            use $crate::tokio::sync::mpsc::{self, Sender, Receiver};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::{trace, warn};

            #[derive(Debug, Deserialize, Serialize)]
            pub enum Request {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name { $($arg_id : $arg_ty),* }
                ),*
            }

            mod replies {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&mut self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<Envelope>,
            }

            impl Client {
                $(
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let req = Request::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: replies::$method_name = serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, mut rx) = mpsc::channel(100);
                    self.tx.send(Envelope {
                        dest: self.server_id.clone(),
                        reply: tx,
                        body: req.clone(),
                    }).await?;
                    if let Some(resp) = rx.recv().await {
                        trace!("req: {}, resp: {}", req, &resp);
                        Ok(resp)
                    } else {
                        Err(anyhow!("unable to receive from server"))
                    }
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<Envelope>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                    }
                }
            }

            #[derive(Debug)]
            pub struct Server<T: Service + Send> {
                svc: T,
                tx: Sender<Envelope>,
                rx: Receiver<Envelope>,
            }

            #[async_trait]
            impl<T: Service + Send> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self { svc, tx, rx }
                }

                fn inbox(&self) -> Sender<Envelope> {
                    self.tx.clone()
                }

                async fn handle(&mut self) -> Result<()> {
                    match self.rx.recv().await {
                        Some(Envelope { reply, body, .. }) => {
                            trace!("handle recv: {}", &body);
                            let req: Request = serde_json::from_str(&body)?;
                            match req {
                                $(
                                    Request::$method_name { $($arg_id),* } => {
                                        let data = self.svc.$method_name($($arg_id),* ).await?;
                                        let resp = replies::$method_name { data };
                                        let resp = serde_json::to_string(&resp)?;
                                        trace!("handle send: {}", &resp);
                                        // The caller may be gone or the
                                        // network may have eaten the reply
                                        // channel; neither is fatal here.
                                        if reply.send(resp).await.is_err() {
                                            warn!("reply went nowhere");
                                        }
                                        Ok(())
                                    }
                                )*
                            }
                        }
                        None => Err(anyhow!("expected sender")),
                    }
                }
            }
        }
    };
}
